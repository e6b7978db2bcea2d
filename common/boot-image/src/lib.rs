// Licensed under the Apache-2.0 license
#![no_std]

//! Binary layout of a multi-hart boot image.
//!
//! An image is a [`BootImageHeader`], a table of [`BootChunkDesc`] terminated
//! by a zero-sized sentinel, a table of [`BootZiChunkDesc`] terminated the same
//! way, and finally the chunk data. Every region is padded to [`PAD_SIZE`].

use bitflags::bitflags;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const BOOT_IMAGE_MAGIC: u32 = 0xB007_C0DE;
pub const BOOT_IMAGE_VERSION: u32 = 0x0001;

/// Size of every fixed name buffer, including the terminating NUL.
pub const BOOT_IMAGE_MAX_NAME_LEN: usize = 256;

/// Application harts described by an image. The monitor hart is not.
pub const NUM_APP_HARTS: usize = 4;

/// Alignment of every region in the image file.
pub const PAD_SIZE: usize = 8;

/// Hart identifier used in chunk descriptors; 0 is the monitor hart.
pub const HART_ID_MONITOR: u32 = 0;

pub const PRIV_MODE_USER: u8 = 0x00;
pub const PRIV_MODE_SUPERVISOR: u8 = 0x01;
pub const PRIV_MODE_MACHINE: u8 = 0x03;
pub const PRIV_MODE_UNSET: u8 = 0xFF;

bitflags! {
    /// Per-hart boot entitlements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BootFlags: u32 {
        const SKIP_AUTOBOOT = 0x08;
        const ALLOW_WARM_REBOOT = 0x10;
        const ALLOW_COLD_REBOOT = 0x20;
        const SKIP_OPENSBI = 0x40;
        const ANCILLARY_DATA = 0x80;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct HartHeader {
    pub entry_point: u64,
    pub priv_mode: u8,
    pub reserved: [u8; 3],
    pub flags: u32,
    pub num_chunks: u64,
    pub first_chunk: u64,
    pub last_chunk: u64,
    pub name: [u8; BOOT_IMAGE_MAX_NAME_LEN],
}

impl HartHeader {
    pub fn boot_flags(&self) -> BootFlags {
        BootFlags::from_bits_truncate(self.flags)
    }

    pub fn name(&self) -> &str {
        c_str(&self.name)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootImageHeader {
    pub magic: u32,
    pub version: u32,
    pub header_length: u64,
    pub header_crc: u32,
    pub reserved: u32,
    pub chunk_table_offset: u64,
    pub zi_chunk_table_offset: u64,
    pub hart: [HartHeader; NUM_APP_HARTS],
    pub set_name: [u8; BOOT_IMAGE_MAX_NAME_LEN],
    pub boot_image_length: u64,
}

impl BootImageHeader {
    pub fn set_name(&self) -> &str {
        c_str(&self.set_name)
    }

    /// Copy of the header with `header_crc` cleared, which is what the
    /// checksum is computed over.
    pub fn crc_view(&self) -> Self {
        let mut copy = *self;
        copy.header_crc = 0;
        copy
    }

    pub fn is_magic_valid(&self) -> bool {
        self.magic == BOOT_IMAGE_MAGIC
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootChunkDesc {
    pub owner: u32,
    pub reserved: u32,
    /// Offset of the chunk data within the image file.
    pub load_addr: u64,
    pub exec_addr: u64,
    pub size: u64,
    pub crc32: u32,
    pub reserved2: u32,
}

impl BootChunkDesc {
    pub fn is_sentinel(&self) -> bool {
        self.size == 0
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootZiChunkDesc {
    pub owner: u32,
    pub reserved: u32,
    pub exec_addr: u64,
    pub size: u64,
}

impl BootZiChunkDesc {
    pub fn is_sentinel(&self) -> bool {
        self.size == 0
    }
}

/// Number of zero bytes needed to bring `size` up to a multiple of `pad`.
pub const fn padding(size: usize, pad: usize) -> usize {
    size.next_multiple_of(pad) - size
}

/// Interprets a fixed, NUL-terminated name buffer. Invalid UTF-8 yields the
/// longest valid prefix.
pub fn c_str(buf: &[u8]) -> &str {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    match core::str::from_utf8(&buf[..len]) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&buf[..e.valid_up_to()]).unwrap_or_default(),
    }
}
