// Licensed under the Apache-2.0 license

use std::path::Path;

use log::debug;

use crate::error::PayloadError;
use crate::model::HartId;
use crate::parser::PayloadSink;
use crate::{blob, elf};

/// File-backed data destined for `exec_addr` on `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub owner: HartId,
    pub exec_addr: u64,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn crc32(&self) -> u32 {
        crc32fast::hash(&self.data)
    }
}

/// Memory that is cleared to zero before `owner` starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZiChunk {
    pub owner: HartId,
    pub exec_addr: u64,
    pub size: u64,
}

/// First and last chunk index of a hart, and how many chunks it owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HartChunks {
    pub first: usize,
    pub last: usize,
    pub count: usize,
}

/// Chunks collected from every payload, in the order they will be written.
#[derive(Debug, Default)]
pub struct ChunkTable {
    chunks: Vec<Chunk>,
    zi_chunks: Vec<ZiChunk>,
    wide_output: bool,
}

impl ChunkTable {
    pub fn new(wide_output: bool) -> Self {
        Self {
            wide_output,
            ..Default::default()
        }
    }

    pub fn add_chunk(&mut self, owner: HartId, exec_addr: u64, data: Vec<u8>) {
        let chunk = Chunk {
            owner,
            exec_addr,
            data,
        };
        debug!(
            "chunk: owner = {owner}, exec_addr = {exec_addr:#018x}, size = {:#x}, CRC32 = {:08x}",
            chunk.data.len(),
            chunk.crc32()
        );
        self.chunks.push(chunk);
    }

    pub fn add_zi_chunk(&mut self, owner: HartId, exec_addr: u64, size: u64) {
        debug!("ZI chunk: owner = {owner}, exec_addr = {exec_addr:#018x}, size = {size:#x}");
        self.zi_chunks.push(ZiChunk {
            owner,
            exec_addr,
            size,
        });
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn zi_chunks(&self) -> &[ZiChunk] {
        &self.zi_chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.zi_chunks.is_empty()
    }

    pub fn hart_chunks(&self, hart: HartId) -> HartChunks {
        let mut owned = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.owner == hart)
            .map(|(i, _)| i);
        let Some(first) = owned.next() else {
            return HartChunks::default();
        };
        let (last, count) = owned.fold((first, 1), |(_, count), i| (i, count + 1));
        HartChunks { first, last, count }
    }
}

impl PayloadSink for ChunkTable {
    fn extract_segments(
        &mut self,
        path: &str,
        owner: HartId,
        exec_addr: u64,
    ) -> Result<bool, PayloadError> {
        let wide_output = self.wide_output;
        elf::extract_segments(self, Path::new(path), owner, exec_addr, wide_output)
    }

    fn embed_blob(
        &mut self,
        path: &str,
        exec_addr: u64,
        owner: HartId,
        ancillary: Option<&str>,
    ) -> Result<(), PayloadError> {
        blob::embed(self, Path::new(path), exec_addr, owner, ancillary.map(Path::new))
    }
}
