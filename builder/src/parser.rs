// Licensed under the Apache-2.0 license

//! Event-driven parser that turns a payload configuration into a
//! [`BootImage`].
//!
//! The parser is a state machine over [`ConfigEvent`]s. Each state accepts
//! only the events that make sense in it; anything else is a fatal
//! [`ConfigError`]. Mapping starts that only open a nested block are
//! absorbed, and the block is left on the matching mapping end.
//!
//! A payload block is buffered in a [`PayloadSpec`] carried by the
//! payload states and committed to the image when the block closes.

use std::fmt;
use std::mem;

use log::{debug, info, trace};

use crate::error::{ConfigError, PayloadError};
use crate::events::{ConfigEvent, EventKind, EventReader};
use crate::flags;
use crate::model::{BootImage, HartId, PayloadSpec, PrivMode, MAX_SECONDARY_HARTS};
use crate::token::{Token, TokenMatch};

/// Where payload files go once their block has been parsed.
pub trait PayloadSink {
    /// Splits `path` into boot chunks if it is an executable image.
    /// Returns `Ok(false)` if it is not one.
    fn extract_segments(
        &mut self,
        path: &str,
        owner: HartId,
        exec_addr: u64,
    ) -> Result<bool, PayloadError>;

    /// Embeds `path` as a single opaque chunk at `exec_addr`, followed by
    /// the ancillary data file if one is given.
    fn embed_blob(
        &mut self,
        path: &str,
        exec_addr: u64,
        owner: HartId,
        ancillary: Option<&str>,
    ) -> Result<(), PayloadError>;
}

/// Payload attribute whose value is expected next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    ExecAddr,
    OwnerHart,
    SecondaryHart,
    PayloadName,
    PrivMode,
    SkipOpenSbi,
    SkipAutoboot,
    AllowReboot,
    AncillaryData,
}

impl PayloadField {
    fn from_token(token: Token) -> Option<Self> {
        Some(match token {
            Token::ExecAddr => PayloadField::ExecAddr,
            Token::OwnerHart => PayloadField::OwnerHart,
            Token::SecondaryHart => PayloadField::SecondaryHart,
            Token::PayloadName => PayloadField::PayloadName,
            Token::PrivMode => PayloadField::PrivMode,
            Token::SkipOpenSbi => PayloadField::SkipOpenSbi,
            Token::SkipAutoboot => PayloadField::SkipAutoboot,
            Token::AllowReboot => PayloadField::AllowReboot,
            Token::AncillaryData => PayloadField::AncillaryData,
            _ => return None,
        })
    }

    fn state_name(self) -> &'static str {
        match self {
            PayloadField::ExecAddr => "NewPayload.exec-addr",
            PayloadField::OwnerHart => "NewPayload.owner-hart",
            PayloadField::SecondaryHart => "NewPayload.secondary-hart",
            PayloadField::PayloadName => "NewPayload.payload-name",
            PayloadField::PrivMode => "NewPayload.priv-mode",
            PayloadField::SkipOpenSbi => "NewPayload.skip-opensbi",
            PayloadField::SkipAutoboot => "NewPayload.skip-autoboot",
            PayloadField::AllowReboot => "NewPayload.allow-reboot",
            PayloadField::AncillaryData => "NewPayload.ancilliary-data",
        }
    }
}

#[derive(Debug)]
enum ParserState {
    Idle,
    Stream,
    Document,
    Mapping,
    SetName,
    HartEntryPoints,
    HartEntryPoint(HartId),
    PayloadMappings,
    NewPayload(PayloadSpec),
    PayloadValue(PayloadSpec, PayloadField),
    Done,
    /// An event was rejected; nothing further is accepted.
    Failed,
}

impl ParserState {
    fn name(&self) -> &'static str {
        match self {
            ParserState::Idle => "Idle",
            ParserState::Stream => "Stream",
            ParserState::Document => "Document",
            ParserState::Mapping => "Mapping",
            ParserState::SetName => "SetName",
            ParserState::HartEntryPoints => "HartEntryPoints",
            ParserState::HartEntryPoint(HartId::U54_1) => "HartEntryPoints.U54_1",
            ParserState::HartEntryPoint(HartId::U54_2) => "HartEntryPoints.U54_2",
            ParserState::HartEntryPoint(HartId::U54_3) => "HartEntryPoints.U54_3",
            ParserState::HartEntryPoint(HartId::U54_4) => "HartEntryPoints.U54_4",
            ParserState::PayloadMappings => "PayloadMappings",
            ParserState::NewPayload(_) => "NewPayload",
            ParserState::PayloadValue(_, field) => field.state_name(),
            ParserState::Done => "Done",
            ParserState::Failed => "Failed",
        }
    }
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State name and source position of the event being handled, for
/// diagnostics.
#[derive(Clone, Copy)]
struct Location {
    state: &'static str,
    line: usize,
    column: usize,
}

impl Location {
    fn illegal_event(&self, kind: &EventKind) -> ConfigError {
        ConfigError::IllegalEvent {
            state: self.state.to_string(),
            event: kind.to_string(),
            line: self.line,
            column: self.column,
        }
    }

    fn illegal_token(&self, scalar: &str) -> ConfigError {
        ConfigError::IllegalToken {
            state: self.state.to_string(),
            scalar: scalar.to_string(),
            line: self.line,
            column: self.column,
        }
    }

    fn invalid_number(&self, scalar: &str) -> ConfigError {
        ConfigError::InvalidNumber {
            state: self.state.to_string(),
            scalar: scalar.to_string(),
            line: self.line,
            column: self.column,
        }
    }

    fn invalid_bool(&self, scalar: &str) -> ConfigError {
        ConfigError::InvalidBool {
            state: self.state.to_string(),
            scalar: scalar.to_string(),
            line: self.line,
            column: self.column,
        }
    }
}

/// Parser context: the current state plus everything the configuration has
/// established so far.
pub struct ConfigParser<'s, S: PayloadSink> {
    state: ParserState,
    image: BootImage,
    /// Set by `set-name` or by the first payload with a `payload-name`.
    /// Once set, closing payloads no longer extend the set name.
    override_set_name: bool,
    payload_count: usize,
    token_match: TokenMatch,
    sink: &'s mut S,
}

impl<'s, S: PayloadSink> ConfigParser<'s, S> {
    pub fn new(sink: &'s mut S, token_match: TokenMatch) -> Self {
        Self {
            state: ParserState::Idle,
            image: BootImage::default(),
            override_set_name: false,
            payload_count: 0,
            token_match,
            sink,
        }
    }

    /// The image as built so far.
    pub fn image(&self) -> &BootImage {
        &self.image
    }

    pub fn payload_count(&self) -> usize {
        self.payload_count
    }

    /// Feeds one event to the state machine.
    pub fn handle(&mut self, event: ConfigEvent) -> Result<(), ConfigError> {
        let state = mem::replace(&mut self.state, ParserState::Failed);
        let from = state.name();
        let next = self.transition(state, event)?;
        if next.name() != from {
            trace!("{from} -> {next}");
        }
        self.state = next;
        Ok(())
    }

    /// Returns the finished image. Fails unless the end of the stream has
    /// been reached.
    pub fn finish(self) -> Result<BootImage, ConfigError> {
        match self.state {
            ParserState::Done => Ok(self.image),
            state => Err(ConfigError::UnexpectedEnd {
                state: state.name().to_string(),
            }),
        }
    }

    fn token(&self, scalar: &str) -> Token {
        Token::resolve(scalar, self.token_match)
    }

    fn transition(
        &mut self,
        state: ParserState,
        event: ConfigEvent,
    ) -> Result<ParserState, ConfigError> {
        use ParserState as State;

        let at = Location {
            state: state.name(),
            line: event.line,
            column: event.column,
        };

        match (state, event.kind) {
            (State::Idle, EventKind::StreamStart) => Ok(State::Stream),

            (State::Stream, EventKind::DocumentStart) => Ok(State::Document),
            (State::Stream, EventKind::StreamEnd) => Ok(State::Done),

            (State::Document, EventKind::MappingStart) => Ok(State::Mapping),
            (State::Document, EventKind::DocumentEnd) => Ok(State::Stream),

            (State::Mapping, EventKind::MappingEnd) => Ok(State::Document),
            (State::Mapping, EventKind::Scalar(key)) => match self.token(&key) {
                Token::SetName => Ok(State::SetName),
                Token::HartEntryPoints => Ok(State::HartEntryPoints),
                Token::Payloads => Ok(State::PayloadMappings),
                _ => Err(at.illegal_token(&key)),
            },

            (State::SetName, EventKind::Scalar(name)) => {
                self.override_set_name = true;
                self.image.set_name.set(&name);
                debug!("Set-name is >>{}<<", self.image.set_name);
                Ok(State::Mapping)
            }

            (state @ State::HartEntryPoints, EventKind::MappingStart) => Ok(state),
            (State::HartEntryPoints, EventKind::MappingEnd) => Ok(State::Mapping),
            (State::HartEntryPoints, EventKind::Scalar(key)) => self
                .token(&key)
                .hart()
                .map(State::HartEntryPoint)
                .ok_or_else(|| at.illegal_token(&key)),

            (State::HartEntryPoint(hart), EventKind::Scalar(value)) => {
                let addr = parse_number(&value).ok_or_else(|| at.invalid_number(&value))?;
                let entry_point = &mut self.image.hart_mut(hart).entry_point;
                if entry_point.is_some() {
                    return Err(ConfigError::DuplicateEntryPoint { hart });
                }
                *entry_point = Some(addr);
                debug!("{hart} entry point is {addr:#x}");
                Ok(State::HartEntryPoints)
            }

            (state @ State::PayloadMappings, EventKind::MappingStart) => Ok(state),
            (State::PayloadMappings, EventKind::MappingEnd) => Ok(State::Mapping),
            (State::PayloadMappings, EventKind::Scalar(path)) => {
                info!("Parsing payload >>{path}<<");
                Ok(State::NewPayload(PayloadSpec::new(&path)))
            }

            (state @ State::NewPayload(_), EventKind::MappingStart) => Ok(state),
            (State::NewPayload(payload), EventKind::MappingEnd) => {
                self.close_payload(payload)?;
                Ok(State::PayloadMappings)
            }
            (State::NewPayload(payload), EventKind::Scalar(key)) => {
                match PayloadField::from_token(self.token(&key)) {
                    Some(field) => Ok(State::PayloadValue(payload, field)),
                    None => Err(at.illegal_token(&key)),
                }
            }

            (State::PayloadValue(mut payload, field), EventKind::Scalar(value)) => {
                self.payload_value(&mut payload, field, &value, at)?;
                Ok(State::NewPayload(payload))
            }

            (_, kind) => Err(at.illegal_event(&kind)),
        }
    }

    fn payload_value(
        &mut self,
        payload: &mut PayloadSpec,
        field: PayloadField,
        value: &str,
        at: Location,
    ) -> Result<(), ConfigError> {
        match field {
            PayloadField::ExecAddr => {
                payload.exec_addr = parse_number(value).ok_or_else(|| at.invalid_number(value))?;
                debug!("\texec_addr is {:#x}", payload.exec_addr);
            }
            PayloadField::OwnerHart => {
                let hart = self.hart(value, at)?;
                debug!("\towner is {hart}");
                payload.owner = Some(hart);
            }
            PayloadField::SecondaryHart => {
                let hart = self.hart(value, at)?;
                payload
                    .secondary
                    .try_push(hart)
                    .map_err(|_| ConfigError::TooManySecondaries {
                        payload: payload.base_name.clone(),
                        max: MAX_SECONDARY_HARTS,
                    })?;
                debug!("\tsecondary hart is {hart}");
            }
            PayloadField::PayloadName => {
                debug!("\tpayload name is >>{value}<<");
                payload.payload_name = Some(value.to_string());
            }
            PayloadField::PrivMode => {
                let mode = self
                    .token(value)
                    .priv_mode()
                    .ok_or_else(|| at.illegal_token(value))?;
                self.assign_priv_mode(payload, mode)?;
            }
            PayloadField::SkipOpenSbi => {
                payload.entitlements.skip_opensbi =
                    parse_bool(value).ok_or_else(|| at.invalid_bool(value))?;
            }
            PayloadField::SkipAutoboot => {
                payload.entitlements.skip_autoboot =
                    parse_bool(value).ok_or_else(|| at.invalid_bool(value))?;
            }
            PayloadField::AllowReboot => {
                let policy = self
                    .token(value)
                    .reboot_policy()
                    .ok_or_else(|| at.illegal_token(value))?;
                payload.entitlements.allow_reboot(policy);
            }
            PayloadField::AncillaryData => {
                debug!("\tancillary data is >>{value}<<");
                payload.entitlements.ancillary_data = true;
                payload.ancillary_name = Some(value.to_string());
            }
        }
        Ok(())
    }

    fn hart(&self, value: &str, at: Location) -> Result<HartId, ConfigError> {
        self.token(value)
            .hart()
            .ok_or_else(|| at.illegal_token(value))
    }

    /// The owner takes `mode` unconditionally. A secondary hart may only be
    /// given a mode once.
    fn assign_priv_mode(
        &mut self,
        payload: &mut PayloadSpec,
        mode: PrivMode,
    ) -> Result<(), ConfigError> {
        let owner = payload
            .owner
            .ok_or_else(|| ConfigError::PrivModeWithoutOwner {
                payload: payload.base_name.clone(),
            })?;
        payload.priv_mode = mode;
        debug!("\tpriv_mode is {mode}");

        trace!("\tSetting priv mode for {owner} to {mode}");
        self.image.hart_mut(owner).priv_mode = mode;

        for &hart in &payload.secondary {
            let current = self.image.hart(hart).priv_mode;
            if current != PrivMode::Unset {
                return Err(ConfigError::PrivModeConflict {
                    hart,
                    requested: mode,
                    current,
                });
            }
            trace!("\tSetting priv mode for {hart} to {mode}");
            self.image.hart_mut(hart).priv_mode = mode;
        }
        Ok(())
    }

    fn close_payload(&mut self, payload: PayloadSpec) -> Result<(), ConfigError> {
        let name = payload.display_name();

        if !self.override_set_name {
            if self.payload_count > 0 {
                self.image.set_name.push_str("+");
            }
            self.image.set_name.push_str(name);
        }
        if payload.payload_name.is_some() {
            self.override_set_name = true;
        }

        let owner = payload.owner.ok_or_else(|| ConfigError::MissingOwner {
            payload: payload.base_name.clone(),
        })?;

        self.image.hart_mut(owner).name.append_joined(name);

        if !self
            .sink
            .extract_segments(&payload.base_name, owner, payload.exec_addr)?
        {
            debug!("{} is not an ELF file, embedding as a blob", payload.base_name);
            self.sink.embed_blob(
                &payload.base_name,
                payload.exec_addr,
                owner,
                payload.ancillary_name.as_deref(),
            )?;
        }

        flags::apply(
            &mut self.image,
            &payload.entitlements,
            owner,
            &payload.secondary,
        );

        self.payload_count += 1;
        debug!("Closed payload {} >>{name}<<", self.payload_count);
        Ok(())
    }
}

/// Runs the state machine over `events` and returns the finished image.
pub fn parse_events<S, I>(
    events: I,
    sink: &mut S,
    token_match: TokenMatch,
) -> Result<BootImage, ConfigError>
where
    S: PayloadSink,
    I: IntoIterator<Item = Result<ConfigEvent, ConfigError>>,
{
    let mut parser = ConfigParser::new(sink, token_match);
    for event in events {
        parser.handle(event?)?;
    }
    parser.finish()
}

/// Parses YAML configuration text.
pub fn parse_str<S: PayloadSink>(
    content: &str,
    sink: &mut S,
    token_match: TokenMatch,
) -> Result<BootImage, ConfigError> {
    parse_events(EventReader::new(content), sink, token_match)
}

/// Parses an unsigned number: `0x` hexadecimal, a leading `0` for octal,
/// decimal otherwise.
pub fn parse_number(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, radix) = if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        (hex, 16)
    } else if value.len() > 1 && value.starts_with('0') {
        (&value[1..], 8)
    } else {
        (value, 10)
    };
    u64::from_str_radix(digits, radix).ok()
}

/// `true`, `false`, or a number where anything but zero is true.
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        parse_number(value).map(|n| n != 0)
    }
}
