//! # dfesync testkit
//!
//! Test utilities for dfesync.
//!
//! This crate provides:
//! - Store fixtures and sample credentials
//! - Sample fiscal documents (summaries, full invoices, events)
//! - Response builders for both distribution services, docZip encoding included
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dfesync_testkit::prelude::*;
//!
//! let body = NfeResponse::batch(2, 2)
//!     .entry(1, "resNFe_v1.01", &res_nfe(&nfe_key(1), "ACME"))
//!     .build();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod documents;
pub mod envelopes;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::documents::*;
    pub use crate::envelopes::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use documents::*;
pub use envelopes::*;
pub use fixtures::*;
pub use generators::*;
