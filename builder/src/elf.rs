// Licensed under the Apache-2.0 license

//! Splits RISC-V executables into boot chunks.

use std::fs;
use std::path::Path;

use elf::abi::{EM_RISCV, ET_EXEC, PF_R, PF_W, PF_X, PT_LOAD, SHF_ALLOC, SHT_NOBITS};
use elf::endian::AnyEndian;
use elf::section::SectionHeader;
use elf::segment::ProgramHeader;
use elf::ElfBytes;
use log::{debug, info, trace};

use crate::chunks::ChunkTable;
use crate::error::PayloadError;
use crate::model::HartId;

const ELF_MAGIC: &[u8] = b"\x7fELF";

pub fn is_elf(bytes: &[u8]) -> bool {
    bytes.starts_with(ELF_MAGIC)
}

/// True if the section's address range lies within the segment's memory
/// image.
fn section_in_segment(shdr: &SectionHeader, phdr: &ProgramHeader) -> bool {
    shdr.sh_addr >= phdr.p_vaddr
        && shdr.sh_addr.saturating_add(shdr.sh_size) <= phdr.p_vaddr.saturating_add(phdr.p_memsz)
}

fn segment_type(p_type: u32) -> String {
    match p_type {
        PT_LOAD => "LOAD".into(),
        elf::abi::PT_DYNAMIC => "DYNAMIC".into(),
        elf::abi::PT_INTERP => "INTERP".into(),
        elf::abi::PT_NOTE => "NOTE".into(),
        elf::abi::PT_PHDR => "PHDR".into(),
        elf::abi::PT_TLS => "TLS".into(),
        elf::abi::PT_GNU_STACK => "GNU_STACK".into(),
        other => format!("{other:#x}"),
    }
}

fn log_program_header(index: usize, phdr: &ProgramHeader, wide_output: bool) {
    let flags = format!(
        "{}{}{}",
        if phdr.p_flags & PF_R != 0 { 'R' } else { ' ' },
        if phdr.p_flags & PF_W != 0 { 'W' } else { ' ' },
        if phdr.p_flags & PF_X != 0 { 'E' } else { ' ' },
    );
    let head = format!(
        "   {index:02}  {:<14} {:#018x} {:#018x} {:#018x}",
        segment_type(phdr.p_type),
        phdr.p_offset,
        phdr.p_vaddr,
        phdr.p_paddr
    );
    let tail = format!(
        " {:#018x} {:#018x}  {flags}    {:#x}",
        phdr.p_filesz, phdr.p_memsz, phdr.p_align
    );
    if wide_output {
        debug!("{head}{tail}");
    } else {
        debug!("{head}");
        debug!("                     {tail}");
    }
}

/// Adds every allocated section inside a loadable segment of `path` to
/// `table`: file-backed sections as chunks, `NOBITS` sections as ZI chunks.
///
/// Returns `Ok(false)` without touching `table` if the file is not ELF.
/// Sections load at their link addresses, so `exec_addr` is not used.
pub fn extract_segments(
    table: &mut ChunkTable,
    path: &Path,
    owner: HartId,
    exec_addr: u64,
    wide_output: bool,
) -> Result<bool, PayloadError> {
    let bytes = fs::read(path).map_err(|e| PayloadError::io(path, e))?;
    if !is_elf(&bytes) {
        info!(">>{}<< is not an ELF object", path.display());
        return Ok(false);
    }
    debug!("Processing ELF >>{}<<", path.display());

    let elf_error = |message: String| PayloadError::Elf {
        path: path.to_path_buf(),
        message,
    };
    let elf_file = ElfBytes::<AnyEndian>::minimal_parse(&bytes)
        .map_err(|e| elf_error(e.to_string()))?;

    if elf_file.ehdr.e_machine != EM_RISCV {
        return Err(PayloadError::UnsupportedMachine {
            path: path.to_path_buf(),
            machine: elf_file.ehdr.e_machine,
        });
    }
    if elf_file.ehdr.e_type != ET_EXEC {
        return Err(PayloadError::NotExecutable {
            path: path.to_path_buf(),
            elf_type: elf_file.ehdr.e_type,
        });
    }
    if exec_addr != 0 && exec_addr != elf_file.ehdr.e_entry {
        debug!(
            "exec-addr {exec_addr:#x} ignored, ELF entry point is {:#x}",
            elf_file.ehdr.e_entry
        );
    }

    let Some(segments) = elf_file.segments() else {
        return Err(elf_error("ELF file has no program headers".into()));
    };
    let (sections, strtab) = elf_file
        .section_headers_with_strtab()
        .map_err(|e| elf_error(e.to_string()))?;
    let Some(sections) = sections else {
        return Err(elf_error("ELF file has no section headers".into()));
    };

    debug!("Entry point {:#x}", elf_file.ehdr.e_entry);
    debug!(
        "There are {} program headers, starting at offset {}",
        elf_file.ehdr.e_phnum, elf_file.ehdr.e_phoff
    );
    debug!("Program Headers:");
    for (i, phdr) in segments.iter().enumerate() {
        log_program_header(i, &phdr, wide_output);
    }

    debug!(" Section to Segment mapping:");
    debug!("  Segment Sections...");
    for (i, phdr) in segments.iter().enumerate() {
        let mut names = Vec::new();
        for shdr in sections.iter() {
            let name = strtab
                .as_ref()
                .and_then(|t| t.get(shdr.sh_name as usize).ok())
                .unwrap_or("?");
            if !section_in_segment(&shdr, &phdr) {
                trace!(
                    "Skipping {name}: {:#018x}-{:#018x} vs {:#018x}-{:#018x}",
                    phdr.p_vaddr,
                    phdr.p_vaddr.saturating_add(phdr.p_memsz),
                    shdr.sh_addr,
                    shdr.sh_addr.saturating_add(shdr.sh_size)
                );
                continue;
            }
            trace!(
                "SECTION:: Name: {name}, sh_type: {:#x}, sh_flags: {:#x}, sh_addr: {:#x}, sh_offset: {:#x}, sh_size: {:#x}",
                shdr.sh_type,
                shdr.sh_flags,
                shdr.sh_addr,
                shdr.sh_offset,
                shdr.sh_size
            );
            names.push(name);

            if phdr.p_type != PT_LOAD
                || (shdr.sh_flags & SHF_ALLOC as u64) == 0
                || shdr.sh_size == 0
            {
                continue;
            }
            if shdr.sh_type == SHT_NOBITS {
                table.add_zi_chunk(owner, shdr.sh_addr, shdr.sh_size);
            } else {
                let (data, compression) = elf_file
                    .section_data(&shdr)
                    .map_err(|e| elf_error(e.to_string()))?;
                if compression.is_some() {
                    return Err(elf_error(format!("section {name} is compressed")));
                }
                table.add_chunk(owner, shdr.sh_addr, data.to_vec());
            }
        }
        debug!("   {i:02}     {}", names.join(" "));
    }
    Ok(true)
}
