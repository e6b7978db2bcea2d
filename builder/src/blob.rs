// Licensed under the Apache-2.0 license

use std::fs;
use std::path::Path;

use boot_image::PAD_SIZE;
use log::debug;

use crate::chunks::ChunkTable;
use crate::error::PayloadError;
use crate::model::HartId;

/// A zero-sized chunk would read as the end of the chunk table.
fn read_nonempty(path: &Path) -> Result<Vec<u8>, PayloadError> {
    let data = fs::read(path).map_err(|e| PayloadError::io(path, e))?;
    if data.is_empty() {
        return Err(PayloadError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(data)
}

/// Adds the whole of `path` as one chunk at `exec_addr`. Ancillary data, if
/// given, becomes a second chunk at the next 8-byte boundary after it.
pub fn embed(
    table: &mut ChunkTable,
    path: &Path,
    exec_addr: u64,
    owner: HartId,
    ancillary: Option<&Path>,
) -> Result<(), PayloadError> {
    debug!("Processing blob >>{}<<", path.display());
    let data = read_nonempty(path)?;
    let size = data.len() as u64;
    table.add_chunk(owner, exec_addr, data);

    if let Some(ancillary) = ancillary {
        let ancillary_addr = exec_addr.saturating_add(size).next_multiple_of(PAD_SIZE as u64);
        debug!(
            "Processing ancillary data >>{}<< at {ancillary_addr:#x}",
            ancillary.display()
        );
        let data = read_nonempty(ancillary)?;
        table.add_chunk(owner, ancillary_addr, data);
    }
    Ok(())
}
