// Licensed under the Apache-2.0 license

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const EM_RISCV: u16 = 243;
pub const ET_EXEC: u16 = 2;

pub const TEXT_ADDR: u64 = 0x8000_0000;
pub const TEXT_SIZE: usize = 16;
pub const BSS_ADDR: u64 = 0x8000_0010;
pub const BSS_SIZE: u64 = 32;

/// A RISC-V ELF64 executable with one PT_LOAD segment holding a `.text`
/// section filled with `fill` and a `.bss` section.
pub fn riscv_elf(fill: u8) -> Vec<u8> {
    let mut out = Vec::new();
    let u16le = |out: &mut Vec<u8>, v: u16| out.extend_from_slice(&v.to_le_bytes());
    let u32le = |out: &mut Vec<u8>, v: u32| out.extend_from_slice(&v.to_le_bytes());
    let u64le = |out: &mut Vec<u8>, v: u64| out.extend_from_slice(&v.to_le_bytes());

    // ELF header
    out.extend_from_slice(b"\x7fELF\x02\x01\x01\0\0\0\0\0\0\0\0\0");
    u16le(&mut out, ET_EXEC);
    u16le(&mut out, EM_RISCV);
    u32le(&mut out, 1);
    u64le(&mut out, TEXT_ADDR);
    u64le(&mut out, 64);
    u64le(&mut out, 160);
    u32le(&mut out, 0);
    for v in [64, 56, 1, 64, 4, 3] {
        u16le(&mut out, v);
    }

    // PT_LOAD, RWX
    u32le(&mut out, 1);
    u32le(&mut out, 7);
    for v in [120, TEXT_ADDR, TEXT_ADDR, TEXT_SIZE as u64, 48, 8] {
        u64le(&mut out, v);
    }

    out.extend_from_slice(&[fill; TEXT_SIZE]);
    out.extend_from_slice(b"\0.text\0.bss\0.shstrtab\0\0\0");

    let mut shdr = |name: u32, sh_type: u32, flags: u64, addr: u64, offset: u64, size: u64| {
        u32le(&mut out, name);
        u32le(&mut out, sh_type);
        for v in [flags, addr, offset, size] {
            u64le(&mut out, v);
        }
        u32le(&mut out, 0);
        u32le(&mut out, 0);
        u64le(&mut out, 1);
        u64le(&mut out, 0);
    };
    shdr(0, 0, 0, 0, 0, 0);
    shdr(1, 1, 0x6, TEXT_ADDR, 120, TEXT_SIZE as u64);
    shdr(7, 8, 0x3, BSS_ADDR, 136, BSS_SIZE);
    shdr(12, 3, 0, 0, 136, 22);
    out
}

/// A scratch directory holding payload files, a configuration and the
/// generated image.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes `bytes` to `name` and returns its path as a string for use in
    /// a configuration.
    pub fn file(&self, name: &str, bytes: &[u8]) -> String {
        let path = self.path(name);
        fs::write(&path, bytes).unwrap();
        path.to_str().unwrap().to_string()
    }

    pub fn config(&self, yaml: &str) -> PathBuf {
        let path = self.path("config.yaml");
        fs::write(&path, yaml).unwrap();
        path
    }

    pub fn output(&self) -> PathBuf {
        self.path("payload.bin")
    }
}

pub fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}
