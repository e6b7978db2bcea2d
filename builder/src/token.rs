// Licensed under the Apache-2.0 license

//! Keywords recognised in a payload configuration.

use crate::model::{HartId, PrivMode, RebootPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Unknown,
    SetName,
    HartEntryPoints,
    Payloads,
    ExecAddr,
    OwnerHart,
    SecondaryHart,
    PayloadName,
    PrivMode,
    SkipOpenSbi,
    SkipAutoboot,
    AllowReboot,
    AncillaryData,
    PrvM,
    PrvS,
    PrvU,
    U54_1,
    U54_2,
    U54_3,
    U54_4,
    Warm,
    Cold,
}

/// How a scalar is compared against the keyword literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMatch {
    /// The whole scalar must equal the literal.
    #[default]
    Exact,
    /// The first literal that is a prefix of the scalar wins, so `u54_10`
    /// resolves to `u54_1`. Kept for configurations written against the
    /// older generator.
    Prefix,
}

/// Declaration order matters for [`TokenMatch::Prefix`].
const TOKENS: &[(Token, &str)] = &[
    (Token::SetName, "set-name"),
    (Token::HartEntryPoints, "hart-entry-points"),
    (Token::Payloads, "payloads"),
    (Token::ExecAddr, "exec-addr"),
    (Token::OwnerHart, "owner-hart"),
    (Token::SecondaryHart, "secondary-hart"),
    (Token::PayloadName, "payload-name"),
    (Token::PrivMode, "priv-mode"),
    (Token::SkipOpenSbi, "skip-opensbi"),
    (Token::SkipAutoboot, "skip-autoboot"),
    (Token::AllowReboot, "allow-reboot"),
    (Token::AncillaryData, "ancilliary-data"),
    (Token::PrvM, "prv_m"),
    (Token::PrvS, "prv_s"),
    (Token::PrvU, "prv_u"),
    (Token::U54_1, "u54_1"),
    (Token::U54_2, "u54_2"),
    (Token::U54_3, "u54_3"),
    (Token::U54_4, "u54_4"),
    (Token::Warm, "warm"),
    (Token::Cold, "cold"),
];

impl Token {
    pub fn resolve(scalar: &str, mode: TokenMatch) -> Token {
        TOKENS
            .iter()
            .find(|(_, literal)| match mode {
                TokenMatch::Exact => scalar == *literal,
                TokenMatch::Prefix => scalar.starts_with(literal),
            })
            .map(|(token, _)| *token)
            .unwrap_or(Token::Unknown)
    }

    pub fn literal(self) -> Option<&'static str> {
        TOKENS
            .iter()
            .find(|(token, _)| *token == self)
            .map(|(_, literal)| *literal)
    }

    pub fn hart(self) -> Option<HartId> {
        match self {
            Token::U54_1 => Some(HartId::U54_1),
            Token::U54_2 => Some(HartId::U54_2),
            Token::U54_3 => Some(HartId::U54_3),
            Token::U54_4 => Some(HartId::U54_4),
            _ => None,
        }
    }

    pub fn priv_mode(self) -> Option<PrivMode> {
        match self {
            Token::PrvM => Some(PrivMode::Machine),
            Token::PrvS => Some(PrivMode::Supervisor),
            Token::PrvU => Some(PrivMode::User),
            _ => None,
        }
    }

    pub fn reboot_policy(self) -> Option<RebootPolicy> {
        match self {
            Token::Warm => Some(RebootPolicy::Warm),
            Token::Cold => Some(RebootPolicy::Cold),
            _ => None,
        }
    }
}
