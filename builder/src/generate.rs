// Licensed under the Apache-2.0 license

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use boot_image::{
    padding, BootChunkDesc, BootImageHeader, BootZiChunkDesc, HartHeader, BOOT_IMAGE_MAGIC,
    BOOT_IMAGE_VERSION, PAD_SIZE,
};
use log::{debug, info, trace};
use zerocopy::{FromZeros, IntoBytes};

use crate::chunks::ChunkTable;
use crate::model::{BootImage, HartId};

const HEADER_SIZE: usize = std::mem::size_of::<BootImageHeader>();
const CHUNK_DESC_SIZE: usize = std::mem::size_of::<BootChunkDesc>();
const ZI_CHUNK_DESC_SIZE: usize = std::mem::size_of::<BootZiChunkDesc>();

fn padded(size: usize) -> usize {
    size + padding(size, PAD_SIZE)
}

fn pad(out: &mut Vec<u8>) {
    out.resize(padded(out.len()), 0);
}

fn hart_header(image: &BootImage, chunks: &ChunkTable, hart: HartId) -> HartHeader {
    let desc = image.hart(hart);
    let owned = chunks.hart_chunks(hart);
    HartHeader {
        entry_point: desc.entry_point.unwrap_or(0),
        priv_mode: desc.priv_mode.to_wire(),
        reserved: [0; 3],
        flags: desc.flags.bits(),
        num_chunks: owned.count as u64,
        first_chunk: owned.first as u64,
        last_chunk: owned.last as u64,
        name: desc.name.to_wire(),
    }
}

/// Lays out a complete boot image: header, chunk table, ZI chunk table, then
/// the chunk data, each padded to [`PAD_SIZE`].
pub fn build_image(image: &BootImage, chunks: &ChunkTable) -> Vec<u8> {
    let chunk_table_offset = padded(HEADER_SIZE);
    let zi_chunk_table_offset =
        chunk_table_offset + padded(CHUNK_DESC_SIZE * (chunks.chunks().len() + 1));
    let header_length =
        zi_chunk_table_offset + padded(ZI_CHUNK_DESC_SIZE * (chunks.zi_chunks().len() + 1));

    let mut header = BootImageHeader::new_zeroed();
    header.magic = BOOT_IMAGE_MAGIC;
    header.version = BOOT_IMAGE_VERSION;
    header.header_length = header_length as u64;
    header.chunk_table_offset = chunk_table_offset as u64;
    header.zi_chunk_table_offset = zi_chunk_table_offset as u64;
    header.set_name = image.set_name.to_wire();
    for hart in HartId::ALL {
        header.hart[hart.index()] = hart_header(image, chunks, hart);
    }

    // The header is written last, once its length and CRC are known.
    let mut out = vec![0u8; chunk_table_offset];

    debug!("Outputting Code/Data Chunks");
    let mut load_addr = header_length;
    for (i, chunk) in chunks.chunks().iter().enumerate() {
        let desc = BootChunkDesc {
            owner: chunk.owner.wire_id(),
            reserved: 0,
            load_addr: load_addr as u64,
            exec_addr: chunk.exec_addr,
            size: chunk.data.len() as u64,
            crc32: chunk.crc32(),
            reserved2: 0,
        };
        trace!(
            "\t- chunk {i} ({} bytes) at file position {} (blob is expected at {load_addr})",
            desc.size,
            out.len()
        );
        out.extend_from_slice(desc.as_bytes());
        load_addr += padded(chunk.data.len());
    }
    out.extend_from_slice(BootChunkDesc::new_zeroed().as_bytes());
    pad(&mut out);

    debug!("Outputting ZI Chunks");
    for zi_chunk in chunks.zi_chunks() {
        let desc = BootZiChunkDesc {
            owner: zi_chunk.owner.wire_id(),
            reserved: 0,
            exec_addr: zi_chunk.exec_addr,
            size: zi_chunk.size,
        };
        out.extend_from_slice(desc.as_bytes());
    }
    out.extend_from_slice(BootZiChunkDesc::new_zeroed().as_bytes());
    pad(&mut out);
    debug_assert_eq!(out.len(), header_length);
    trace!("End of header is {header_length}");

    debug!("Outputting Binary Data");
    for chunk in chunks.chunks() {
        out.extend_from_slice(&chunk.data);
        pad(&mut out);
    }

    header.boot_image_length = out.len() as u64;
    header.header_crc = crc32fast::hash(header.crc_view().as_bytes());
    out[..HEADER_SIZE].copy_from_slice(header.as_bytes());
    out
}

/// Serializes the image and its chunks to `output`.
pub fn generate_payload(image: &BootImage, chunks: &ChunkTable, output: &Path) -> Result<()> {
    println!("Output filename is >>{}<<", output.display());
    let bytes = build_image(image, chunks);
    fs::write(output, &bytes)
        .with_context(|| format!("Unable to write boot image {}", output.display()))?;
    info!(
        "Wrote {} bytes ({} chunks, {} ZI chunks)",
        bytes.len(),
        chunks.chunks().len(),
        chunks.zi_chunks().len()
    );
    Ok(())
}
