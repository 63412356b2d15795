//! # dfesync protocol
//!
//! Wire layer for the fiscal document distribution services.
//!
//! This crate provides:
//! - [`Nsu`], the 15-digit sequence cursor
//! - [`AckType`], recipient acknowledgment event codes
//! - [`TaxId`], [`RegionCode`], [`DocumentKey`] identifiers
//! - [`DistributionRequest`] building (SOAP for NF-e, REST path for NFS-e)
//! - [`normalize`], the single step that turns every known response shape
//!   into a [`DistributionEnvelope`]
//! - [`extract`], producing a [`PollResult`] of decoded `(nsu, payload)` pairs
//! - [`parse_document`], classifying a decoded payload and pulling the
//!   metadata the document store indexes
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod ack;
mod document;
mod envelope;
mod error;
mod extract;
mod ids;
mod nsu;
mod request;
mod xml;

pub use ack::AckType;
pub use document::{parse_document, Completeness, DocumentKind, DocumentMeta};
pub use envelope::{normalize, DistributionEnvelope, RawEntry, ResponseStatus, ServiceKind};
pub use error::{ProtocolError, ProtocolResult};
pub use extract::{
    decode_doc_zip, extract, DecodeFailure, Extraction, ExtractedDocument, PollResult,
    MAX_DECOMPRESSED_SIZE,
};
pub use ids::{DocumentKey, Environment, KeyKind, RegionCode, TaxId};
pub use nsu::Nsu;
pub use request::{DistributionQuery, DistributionRequest, SOAP_ACTION};
pub use xml::XmlNode;
