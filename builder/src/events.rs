// Licensed under the Apache-2.0 license

//! Structural events read from a YAML document.
//!
//! The configuration parser only needs the shape of the document, so the
//! reader's events are narrowed down to [`EventKind`] and tagged with their
//! source position.

use std::fmt;
use std::str::Chars;

use yaml_rust2::parser::{Event, Parser};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    StreamStart,
    StreamEnd,
    DocumentStart,
    DocumentEnd,
    MappingStart,
    MappingEnd,
    SequenceStart,
    SequenceEnd,
    Alias,
    Scalar(String),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::StreamStart => f.write_str("STREAM_START"),
            EventKind::StreamEnd => f.write_str("STREAM_END"),
            EventKind::DocumentStart => f.write_str("DOCUMENT_START"),
            EventKind::DocumentEnd => f.write_str("DOCUMENT_END"),
            EventKind::MappingStart => f.write_str("MAPPING_START"),
            EventKind::MappingEnd => f.write_str("MAPPING_END"),
            EventKind::SequenceStart => f.write_str("SEQUENCE_START"),
            EventKind::SequenceEnd => f.write_str("SEQUENCE_END"),
            EventKind::Alias => f.write_str("ALIAS"),
            EventKind::Scalar(value) => write!(f, "SCALAR >>{value}<<"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEvent {
    pub kind: EventKind,
    pub line: usize,
    pub column: usize,
}

impl ConfigEvent {
    /// An event without a meaningful source position.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            line: 0,
            column: 0,
        }
    }

    pub fn scalar(value: &str) -> Self {
        Self::new(EventKind::Scalar(value.to_string()))
    }
}

/// Pulls [`ConfigEvent`]s out of YAML text, one at a time, until the end of
/// the stream.
pub struct EventReader<'a> {
    parser: Parser<Chars<'a>>,
    finished: bool,
}

impl<'a> EventReader<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            parser: Parser::new(content.chars()),
            finished: false,
        }
    }
}

impl Iterator for EventReader<'_> {
    type Item = Result<ConfigEvent, ConfigError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let (event, marker) = match self.parser.next_token() {
                Ok(next) => next,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ConfigError::Yaml {
                        message: e.info().to_string(),
                        line: e.marker().line(),
                        column: e.marker().col(),
                    }));
                }
            };
            let kind = match event {
                Event::Nothing => continue,
                Event::StreamStart => EventKind::StreamStart,
                Event::StreamEnd => {
                    self.finished = true;
                    EventKind::StreamEnd
                }
                Event::DocumentStart { .. } => EventKind::DocumentStart,
                Event::DocumentEnd => EventKind::DocumentEnd,
                Event::MappingStart { .. } => EventKind::MappingStart,
                Event::MappingEnd => EventKind::MappingEnd,
                Event::SequenceStart { .. } => EventKind::SequenceStart,
                Event::SequenceEnd => EventKind::SequenceEnd,
                Event::Alias { .. } => EventKind::Alias,
                Event::Scalar(value, ..) => EventKind::Scalar(value),
            };
            return Some(Ok(ConfigEvent {
                kind,
                line: marker.line(),
                column: marker.col(),
            }));
        }
        None
    }
}
