// Licensed under the Apache-2.0 license

//! Reads back a boot image and reports what it contains.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use boot_image::{BootChunkDesc, BootImageHeader, BootZiChunkDesc, BOOT_IMAGE_MAGIC};
use log::{debug, warn};
use zerocopy::{FromBytes, IntoBytes};

use crate::model::PrivMode;

const HEADER_SIZE: usize = std::mem::size_of::<BootImageHeader>();
const CHUNK_DESC_SIZE: usize = std::mem::size_of::<BootChunkDesc>();
const ZI_CHUNK_DESC_SIZE: usize = std::mem::size_of::<BootZiChunkDesc>();

/// A parsed boot image. The sentinels are not included in the chunk lists.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub header: BootImageHeader,
    pub chunks: Vec<BootChunkDesc>,
    pub zi_chunks: Vec<BootZiChunkDesc>,
}

impl ImageSummary {
    /// Consecutive runs of chunks with the same owner, as (owner, count).
    pub fn chunk_runs(&self) -> Vec<(u32, usize)> {
        owner_runs(self.chunks.iter().map(|c| c.owner))
    }

    pub fn zi_chunk_runs(&self) -> Vec<(u32, usize)> {
        owner_runs(self.zi_chunks.iter().map(|c| c.owner))
    }
}

fn owner_runs(owners: impl Iterator<Item = u32>) -> Vec<(u32, usize)> {
    let mut runs: Vec<(u32, usize)> = Vec::new();
    for owner in owners {
        match runs.last_mut() {
            Some((last, count)) if *last == owner => *count += 1,
            _ => runs.push((owner, 1)),
        }
    }
    runs
}

/// Reads descriptors from `offset` up to and excluding the zero-sized
/// sentinel.
fn read_table<T, F>(
    image: &[u8],
    offset: u64,
    entry_size: usize,
    is_sentinel: F,
) -> Result<Vec<T>>
where
    T: FromBytes,
    F: Fn(&T) -> bool,
{
    let mut entries = Vec::new();
    let mut pos = usize::try_from(offset)?;
    loop {
        let raw = image
            .get(pos..pos + entry_size)
            .ok_or_else(|| anyhow!("Table at {offset:#x} runs past the end of the image"))?;
        let entry = T::read_from_bytes(raw)
            .map_err(|_| anyhow!("Failed to parse table entry at {pos:#x}"))?;
        if is_sentinel(&entry) {
            return Ok(entries);
        }
        entries.push(entry);
        pos += entry_size;
    }
}

/// Parses and checks a boot image. A bad magic number is only a warning; a
/// header or chunk CRC mismatch is an error.
pub fn inspect(image: &[u8]) -> Result<ImageSummary> {
    if image.len() < HEADER_SIZE {
        bail!("Image too small to contain the header.");
    }
    let (header, _) = BootImageHeader::read_from_prefix(image)
        .map_err(|_| anyhow!("Failed to parse header: invalid format or size"))?;

    if !header.is_magic_valid() {
        warn!(
            "Does not look like a valid boot image (expected magic {BOOT_IMAGE_MAGIC:x}, got {:x})",
            header.magic
        );
    }
    let header_crc = crc32fast::hash(header.crc_view().as_bytes());
    if header_crc != header.header_crc {
        bail!(
            "Header CRC mismatch: expected {:#010x}, calculated {header_crc:#010x}",
            header.header_crc
        );
    }

    let chunks: Vec<BootChunkDesc> = read_table(
        image,
        header.chunk_table_offset,
        CHUNK_DESC_SIZE,
        BootChunkDesc::is_sentinel,
    )?;
    let zi_chunks: Vec<BootZiChunkDesc> = read_table(
        image,
        header.zi_chunk_table_offset,
        ZI_CHUNK_DESC_SIZE,
        BootZiChunkDesc::is_sentinel,
    )?;

    for (i, chunk) in chunks.iter().enumerate() {
        let start = usize::try_from(chunk.load_addr)?;
        let size = usize::try_from(chunk.size)?;
        let data = image
            .get(start..start.saturating_add(size))
            .ok_or_else(|| anyhow!("Chunk {i} data runs past the end of the image"))?;
        if crc32fast::hash(data) != chunk.crc32 {
            bail!("Chunk {i} CRC mismatch (owner {})", chunk.owner);
        }
    }

    Ok(ImageSummary {
        header,
        chunks,
        zi_chunks,
    })
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Prints the contents of the boot image at `path`.
pub fn dump_payload(path: &Path, wide_output: bool) -> Result<()> {
    println!("opening >>{}<<", path.display());
    let image =
        fs::read(path).with_context(|| format!("Cannot read file '{}'", path.display()))?;
    let summary = inspect(&image)?;
    let header = &summary.header;

    println!("magic:              {:#x}", header.magic);
    println!("version:            {}", header.version);
    println!("headerLength:       {:#x}", header.header_length);
    println!("chunkTableOffset:   {:#x}", header.chunk_table_offset);
    println!("ziChunkTableOffset: {:#x}", header.zi_chunk_table_offset);
    for (i, hart) in header.hart.iter().enumerate() {
        let priv_mode = PrivMode::from_wire(hart.priv_mode)
            .map(|mode| mode.to_string())
            .unwrap_or_else(|| "Unknown".into());
        println!("name[{i}]:            >>{}<<", hart.name());
        println!("entryPoint[{i}]:      {:#x}", hart.entry_point);
        println!("privMode[{i}]:        {priv_mode}");
        println!("flags[{i}]:           {:#x}", hart.flags);
        let flags = hart.boot_flags();
        if !flags.is_empty() {
            let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
            println!("\t {}", names.join(" "));
        }
        println!("firstChunk[{i}]       {}", hart.first_chunk);
        println!("lastChunk[{i}]        {}", hart.last_chunk);
        println!("numChunks[{i}]        {}", hart.num_chunks);
    }
    println!("set_name            >>{}<<", header.set_name());
    println!("bootImageLength:    {}", header.boot_image_length);
    println!("headerCrc:          {:#010x}", header.header_crc);

    for chunk in &summary.chunks {
        if wide_output {
            debug!(
                "\towner {} load {:#x} exec {:#x} size {:#x} crc {:08x}",
                chunk.owner, chunk.load_addr, chunk.exec_addr, chunk.size, chunk.crc32
            );
        } else {
            debug!("\towner {} load {:#x}", chunk.owner, chunk.load_addr);
            debug!(
                "\t  exec {:#x} size {:#x} crc {:08x}",
                chunk.exec_addr, chunk.size, chunk.crc32
            );
        }
    }
    for (owner, count) in summary.chunk_runs() {
        println!(" - {count} chunk{} found for owner {owner}", plural(count));
    }
    let total = summary.chunks.len();
    println!("Boot Chunks: total of {total} chunk{} found", plural(total));

    for zi_chunk in &summary.zi_chunks {
        debug!(
            "\towner {} exec {:#x} size {:#x}",
            zi_chunk.owner, zi_chunk.exec_addr, zi_chunk.size
        );
    }
    for (owner, count) in summary.zi_chunk_runs() {
        println!(" - {count} ZI chunk{} found for owner {owner}", plural(count));
    }
    let total = summary.zi_chunks.len();
    println!("ZI Chunks: total of {total} chunk{} found", plural(total));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::ChunkTable;
    use crate::generate::build_image;
    use crate::model::{BootImage, HartId};

    fn sample_image() -> Vec<u8> {
        let mut chunks = ChunkTable::default();
        chunks.add_chunk(HartId::U54_1, 0x1000, vec![1; 5]);
        chunks.add_chunk(HartId::U54_1, 0x2000, vec![2; 9]);
        chunks.add_chunk(HartId::U54_3, 0x3000, vec![3; 8]);
        chunks.add_zi_chunk(HartId::U54_3, 0x4000, 0x40);
        build_image(&BootImage::default(), &chunks)
    }

    #[test]
    fn test_inspect() {
        let summary = inspect(&sample_image()).unwrap();
        assert_eq!(summary.chunks.len(), 3);
        assert_eq!(summary.zi_chunks.len(), 1);
        assert_eq!(summary.chunk_runs(), vec![(1, 2), (3, 1)]);
        assert_eq!(summary.zi_chunk_runs(), vec![(3, 1)]);
        assert_eq!(summary.header.hart[0].num_chunks, 2);
        assert_eq!(summary.header.hart[2].first_chunk, 2);
    }

    #[test]
    fn test_header_crc_mismatch() {
        let mut image = sample_image();
        // Flip a byte inside the set name.
        image[HEADER_SIZE - 16] ^= 0xFF;
        let err = inspect(&image).unwrap_err();
        assert!(err.to_string().contains("Header CRC mismatch"));
    }

    #[test]
    fn test_chunk_crc_mismatch() {
        let mut image = sample_image();
        let last = image.len() - 1;
        // Last chunk is 8 bytes, so the final byte is data, not padding.
        image[last] ^= 0xFF;
        let err = inspect(&image).unwrap_err();
        assert!(err.to_string().contains("Chunk 2 CRC mismatch"));
    }

    #[test]
    fn test_truncated() {
        let image = sample_image();
        assert!(inspect(&image[..HEADER_SIZE - 1]).is_err());
        assert!(inspect(&image[..HEADER_SIZE + 8]).is_err());
    }

    #[test]
    fn test_bad_magic_is_not_fatal() {
        let mut image = sample_image();
        let (mut header, _) = BootImageHeader::read_from_prefix(&image).unwrap();
        header.magic = 0x1234_5678;
        header.header_crc = crc32fast::hash(header.crc_view().as_bytes());
        image[..HEADER_SIZE].copy_from_slice(header.as_bytes());
        let summary = inspect(&image).unwrap();
        assert!(!summary.header.is_magic_valid());
    }
}
