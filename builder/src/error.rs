// Licensed under the Apache-2.0 license

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{HartId, PrivMode};

/// Errors raised while turning a configuration into a boot-image model.
///
/// Every variant is fatal: the caller reports it and no image is written.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("In {state}: illegal event {event} (line {line}, column {column})")]
    IllegalEvent {
        state: String,
        event: String,
        line: usize,
        column: usize,
    },
    #[error("In {state}: illegal token >>{scalar}<< (line {line}, column {column})")]
    IllegalToken {
        state: String,
        scalar: String,
        line: usize,
        column: usize,
    },
    #[error("In {state}: >>{scalar}<< is not a number (line {line}, column {column})")]
    InvalidNumber {
        state: String,
        scalar: String,
        line: usize,
        column: usize,
    },
    #[error("In {state}: >>{scalar}<< is not a boolean (line {line}, column {column})")]
    InvalidBool {
        state: String,
        scalar: String,
        line: usize,
        column: usize,
    },
    #[error("Payload >>{payload}<< has no owner-hart")]
    MissingOwner { payload: String },
    #[error("Payload >>{payload}<< sets priv-mode before owner-hart")]
    PrivModeWithoutOwner { payload: String },
    #[error("Attempted to set {hart} to priv_mode {requested}, but it is already set to {current}")]
    PrivModeConflict {
        hart: HartId,
        requested: PrivMode,
        current: PrivMode,
    },
    #[error("Payload >>{payload}<< lists more than {max} secondary harts")]
    TooManySecondaries { payload: String, max: usize },
    #[error("Entry point for {hart} is given more than once")]
    DuplicateEntryPoint { hart: HartId },
    #[error("Configuration ended in {state} before the stream was complete")]
    UnexpectedEnd { state: String },
    #[error("YAML error at line {line}, column {column}: {message}")]
    Yaml {
        message: String,
        line: usize,
        column: usize,
    },
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Errors from the collaborators that turn payload files into boot chunks.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Cannot read payload '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Payload '{}' is empty", .path.display())]
    Empty { path: PathBuf },
    #[error("Failed to parse ELF file '{}': {message}", .path.display())]
    Elf { path: PathBuf, message: String },
    #[error("Machine type check failed for '{}': machine type is {machine}. Only RISC-V payloads are supported.", .path.display())]
    UnsupportedMachine { path: PathBuf, machine: u16 },
    #[error("ELF type check failed for '{}': ELF type is {elf_type}. Only executable payloads are supported.", .path.display())]
    NotExecutable { path: PathBuf, elf_type: u16 },
}

impl PayloadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
