//! Recipient acknowledgment event types.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Acknowledgment a recipient can register against an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckType {
    /// Confirmation of the operation (210200).
    Confirmation,
    /// Awareness of the operation (210210).
    Awareness,
    /// The operation is unknown to the recipient (210220).
    Unknown,
    /// The operation was not performed (210240).
    NotPerformed,
}

impl AckType {
    /// All acknowledgment types.
    pub const ALL: [AckType; 4] = [
        Self::Confirmation,
        Self::Awareness,
        Self::Unknown,
        Self::NotPerformed,
    ];

    /// Six-digit event type code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Confirmation => "210200",
            Self::Awareness => "210210",
            Self::Unknown => "210220",
            Self::NotPerformed => "210240",
        }
    }

    /// Event description as the service expects it in `descEvento`.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Confirmation => "Confirmacao da Operacao",
            Self::Awareness => "Ciencia da Operacao",
            Self::Unknown => "Desconhecimento da Operacao",
            Self::NotPerformed => "Operacao nao Realizada",
        }
    }
}

impl fmt::Display for AckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AckType {
    type Err = ProtocolError;

    /// Accepts either the event code or the snake_case name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| {
                t.code() == s
                    || match t {
                        Self::Confirmation => s == "confirmation",
                        Self::Awareness => s == "awareness",
                        Self::Unknown => s == "unknown",
                        Self::NotPerformed => s == "not_performed",
                    }
            })
            .ok_or_else(|| ProtocolError::Unsupported(format!("acknowledgment type {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_names() {
        assert_eq!("210210".parse::<AckType>().unwrap(), AckType::Awareness);
        assert_eq!("not_performed".parse::<AckType>().unwrap(), AckType::NotPerformed);
        assert!("110111".parse::<AckType>().is_err());
    }
}
