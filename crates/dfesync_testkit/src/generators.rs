//! Property-based test generators using proptest.

use crate::documents::nfe_key;
use dfesync_protocol::{Completeness, DocumentKey, Nsu};
use proptest::prelude::*;

/// Strategy for generating in-range NSUs.
pub fn nsu_strategy() -> impl Strategy<Value = Nsu> {
    (0..=Nsu::MAX_VALUE).prop_map(|value| Nsu::new(value).expect("NSU in range"))
}

/// Strategy for generating small NSUs that collide often.
pub fn small_nsu_strategy() -> impl Strategy<Value = Nsu> {
    (0u64..64).prop_map(|value| Nsu::new(value).expect("NSU in range"))
}

/// Strategy for generating valid invoice keys.
pub fn nfe_key_strategy() -> impl Strategy<Value = DocumentKey> {
    (1u32..999_999_999)
        .prop_map(|number| DocumentKey::parse(&nfe_key(number)).expect("Invalid generated key"))
}

/// Strategy for generating arrival orders of summaries and full documents.
pub fn completeness_sequence_strategy() -> impl Strategy<Value = Vec<Completeness>> {
    prop::collection::vec(
        prop_oneof![Just(Completeness::Summary), Just(Completeness::Complete)],
        1..12,
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_protocol::KeyKind;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn nsu_renders_fifteen_digits(nsu in nsu_strategy()) {
            prop_assert_eq!(nsu.to_string().len(), Nsu::WIDTH);
        }

        #[test]
        fn generated_keys_are_invoices(key in nfe_key_strategy()) {
            prop_assert_eq!(key.kind(), KeyKind::Nfe);
        }

        #[test]
        fn sequences_are_not_empty(seq in completeness_sequence_strategy()) {
            prop_assert!(!seq.is_empty());
        }
    }
}
