//! The NSU sequence cursor.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A distribution sequence number ("NSU").
///
/// The service assigns these monotonically per taxpayer. On the wire and in
/// every user-facing surface it is a 15-digit zero-padded decimal string.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Nsu(u64);

impl Nsu {
    /// Number of digits in the wire form.
    pub const WIDTH: usize = 15;

    /// Largest value expressible in 15 digits.
    pub const MAX_VALUE: u64 = 999_999_999_999_999;

    /// The starting point of a full resync.
    pub const ZERO: Nsu = Nsu(0);

    /// Creates an NSU from its numeric value.
    pub fn new(value: u64) -> ProtocolResult<Self> {
        if value > Self::MAX_VALUE {
            return Err(ProtocolError::InvalidNsu(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Parses the wire form. Leading zeros are optional; surrounding
    /// whitespace is ignored.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let digits = text.trim();
        if digits.is_empty()
            || digits.len() > Self::WIDTH
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ProtocolError::InvalidNsu(text.to_string()));
        }
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ProtocolError::InvalidNsu(text.to_string()))
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns whichever of the two is higher.
    #[must_use]
    pub fn max(self, other: Nsu) -> Nsu {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Nsu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:015}", self.0)
    }
}

impl FromStr for Nsu {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Nsu {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Nsu> for String {
    fn from(nsu: Nsu) -> Self {
        nsu.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_renders_fifteen_digits() {
        assert_eq!(Nsu::ZERO.to_string(), "000000000000000");
        assert_eq!(Nsu::new(2).unwrap().to_string(), "000000000000002");
    }

    #[test]
    fn parse_accepts_unpadded_and_padded() {
        assert_eq!(Nsu::parse("000000000000042").unwrap().value(), 42);
        assert_eq!(Nsu::parse(" 42 ").unwrap().value(), 42);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Nsu::parse("").is_err());
        assert!(Nsu::parse("12a").is_err());
        assert!(Nsu::parse("-1").is_err());
        assert!(Nsu::parse("1000000000000000").is_err());
        assert!(Nsu::new(Nsu::MAX_VALUE + 1).is_err());
    }

    #[test]
    fn serde_uses_wire_form() {
        let json = serde_json::to_string(&Nsu::new(7).unwrap()).unwrap();
        assert_eq!(json, "\"000000000000007\"");
        let back: Nsu = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), 7);
    }

    proptest! {
        #[test]
        fn display_parses_back(value in 0u64..=Nsu::MAX_VALUE) {
            let nsu = Nsu::new(value).unwrap();
            let text = nsu.to_string();
            prop_assert_eq!(text.len(), Nsu::WIDTH);
            prop_assert_eq!(Nsu::parse(&text).unwrap(), nsu);
        }
    }
}
