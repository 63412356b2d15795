//! Error types for the protocol layer.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building requests or decoding responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A sequence number was not 1 to 15 decimal digits.
    #[error("invalid NSU: {0:?}")]
    InvalidNsu(String),

    /// A tax ID was neither an 11-digit CPF nor a 14-digit CNPJ.
    #[error("invalid tax ID: {0:?}")]
    InvalidTaxId(String),

    /// A region code is not a known two-digit state code.
    #[error("invalid region code: {0:?}")]
    InvalidRegion(String),

    /// A document key has the wrong length or non-digit characters.
    #[error("invalid document key: {0:?}")]
    InvalidKey(String),

    /// XML could not be parsed.
    #[error("malformed XML: {0}")]
    Xml(String),

    /// JSON could not be parsed.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An entry's content was not valid base64.
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// An entry's content was not a valid gzip stream.
    #[error("decompression failed: {0}")]
    Decompress(#[from] std::io::Error),

    /// A decompressed entry exceeded the size limit.
    #[error("decompressed payload exceeds {limit} bytes")]
    PayloadTooLarge {
        /// The limit in bytes.
        limit: usize,
    },

    /// A decoded payload was not UTF-8 text.
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The document's root element is not a known schema.
    #[error("unsupported document schema: {0}")]
    UnsupportedSchema(String),

    /// A field the document needs is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The operation is not offered by this service.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
