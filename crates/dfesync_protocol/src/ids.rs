//! Taxpayer, region and document identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A taxpayer identity: company (CNPJ) or individual (CPF).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaxId {
    /// 14-digit company registration.
    Cnpj(String),
    /// 11-digit individual registration.
    Cpf(String),
}

impl TaxId {
    /// Parses a tax ID, ignoring the usual `.`, `/` and `-` punctuation.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let digits: String = text
            .chars()
            .filter(|c| !matches!(c, '.' | '/' | '-' | ' '))
            .collect();
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::InvalidTaxId(text.to_string()));
        }
        match digits.len() {
            14 => Ok(Self::Cnpj(digits)),
            11 => Ok(Self::Cpf(digits)),
            _ => Err(ProtocolError::InvalidTaxId(text.to_string())),
        }
    }

    /// Returns the bare digits.
    #[must_use]
    pub fn digits(&self) -> &str {
        match self {
            Self::Cnpj(d) | Self::Cpf(d) => d,
        }
    }

    /// Returns the XML element name the service expects for this kind.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cnpj(_) => "CNPJ",
            Self::Cpf(_) => "CPF",
        }
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.digits())
    }
}

impl TryFrom<String> for TaxId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaxId> for String {
    fn from(id: TaxId) -> Self {
        id.digits().to_string()
    }
}

/// Two-digit IBGE state code used to route requests (`cUFAutor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RegionCode(u8);

impl RegionCode {
    const KNOWN: [u8; 27] = [
        11, 12, 13, 14, 15, 16, 17, 21, 22, 23, 24, 25, 26, 27, 28, 29, 31, 32, 33, 35, 41, 42,
        43, 50, 51, 52, 53,
    ];

    /// Validates a numeric state code.
    pub fn new(code: u8) -> ProtocolResult<Self> {
        if Self::KNOWN.contains(&code) {
            Ok(Self(code))
        } else {
            Err(ProtocolError::InvalidRegion(code.to_string()))
        }
    }

    /// Parses the two-digit form.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        text.trim()
            .parse::<u8>()
            .map_err(|_| ProtocolError::InvalidRegion(text.to_string()))
            .and_then(Self::new)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl TryFrom<u8> for RegionCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionCode> for u8 {
    fn from(code: RegionCode) -> Self {
        code.0
    }
}

/// Which service environment requests are addressed to (`tpAmb`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Live documents with legal effect.
    #[default]
    Production,
    /// The test environment.
    Homologation,
}

impl Environment {
    /// Returns the `tpAmb` code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Production => 1,
            Self::Homologation => 2,
        }
    }
}

/// What a [`DocumentKey`] identifies, decided by its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// 44-digit NF-e access key.
    Nfe,
    /// 50-digit national NFS-e access key.
    Nfse,
    /// 52-digit NF-e event id: event type (6) + key (44) + sequence (2).
    NfeEvent,
    /// 59-digit NFS-e event id: key (50) + event type (6) + sequence (3).
    NfseEvent,
}

/// The unique fixed-length identifier embedded in a fiscal document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Parses a key. A leading `ID`, `NFe` or `NFS` tag (as found in `Id`
    /// attributes) is stripped.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let trimmed = text.trim();
        let digits = ["NFS", "NFe", "ID"]
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(*prefix))
            .unwrap_or(trimmed);
        if !digits.bytes().all(|b| b.is_ascii_digit()) || Self::kind_for(digits.len()).is_none() {
            return Err(ProtocolError::InvalidKey(text.to_string()));
        }
        Ok(Self(digits.to_string()))
    }

    /// Builds the event id for an event attached to `invoice`.
    pub fn event(invoice: &DocumentKey, event_type: &str, sequence: u32) -> ProtocolResult<Self> {
        let event_type = event_type.trim();
        if event_type.len() != 6 || !event_type.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::InvalidKey(event_type.to_string()));
        }
        match invoice.kind() {
            KeyKind::Nfe if sequence < 100 => Self::parse(&format!(
                "{event_type}{}{sequence:02}",
                invoice.0
            )),
            KeyKind::Nfse if sequence < 1000 => Self::parse(&format!(
                "{}{event_type}{sequence:03}",
                invoice.0
            )),
            _ => Err(ProtocolError::InvalidKey(format!(
                "{}/{event_type}/{sequence}",
                invoice.0
            ))),
        }
    }

    fn kind_for(len: usize) -> Option<KeyKind> {
        match len {
            44 => Some(KeyKind::Nfe),
            50 => Some(KeyKind::Nfse),
            52 => Some(KeyKind::NfeEvent),
            59 => Some(KeyKind::NfseEvent),
            _ => None,
        }
    }

    /// Returns what the key identifies.
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        // parse() guarantees one of the known lengths
        Self::kind_for(self.0.len()).unwrap_or(KeyKind::Nfe)
    }

    /// Returns the key as a digit string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the invoice key an event id points at, or the key itself.
    #[must_use]
    pub fn invoice_key(&self) -> &str {
        match self.kind() {
            KeyKind::NfeEvent => &self.0[6..50],
            KeyKind::NfseEvent => &self.0[..50],
            KeyKind::Nfe | KeyKind::Nfse => &self.0,
        }
    }

    /// Extracts the invoice number embedded in the key, without leading zeros.
    #[must_use]
    pub fn invoice_number(&self) -> Option<String> {
        let invoice = self.invoice_key();
        let digits = match invoice.len() {
            44 => &invoice[25..34],
            50 => &invoice[23..36],
            _ => return None,
        };
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> Self {
        key.0
    }
}
