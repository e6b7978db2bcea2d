// Licensed under the Apache-2.0 license

//! Compiles a YAML payload configuration into a multi-hart boot image.

mod blob;
pub mod chunks;
pub mod dump;
mod elf;
pub mod error;
pub mod events;
pub mod flags;
pub mod generate;
pub mod model;
pub mod parser;
pub mod token;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

pub use chunks::ChunkTable;
pub use dump::{dump_payload, inspect, ImageSummary};
pub use error::{ConfigError, PayloadError};
pub use generate::{build_image, generate_payload};
pub use model::{BootImage, HartId, PrivMode};
pub use parser::{ConfigParser, PayloadSink};
pub use token::{Token, TokenMatch};

/// Settings for one run of the compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub token_match: TokenMatch,
    /// Single-line program header and chunk listings in debug output.
    pub wide_output: bool,
}

/// Parses configuration text, reading every payload it names.
pub fn parse_config(
    content: &str,
    options: &CompileOptions,
) -> Result<(BootImage, ChunkTable), ConfigError> {
    let mut chunks = ChunkTable::new(options.wide_output);
    let image = parser::parse_str(content, &mut chunks, options.token_match)?;
    Ok((image, chunks))
}

/// Compiles `config` and writes the boot image to `output`. Nothing is
/// written if the configuration is rejected.
pub fn compile(config: &Path, output: &Path, options: &CompileOptions) -> Result<BootImage> {
    info!("Input filename is >>{}<<", config.display());
    let content = fs::read_to_string(config)
        .with_context(|| format!("Cannot read configuration '{}'", config.display()))?;
    let (image, chunks) = parse_config(&content, options)?;
    println!("Set-name is >>{}<<", image.set_name);
    generate_payload(&image, &chunks, output)?;
    Ok(image)
}
