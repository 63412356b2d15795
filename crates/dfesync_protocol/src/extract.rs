//! docZip decoding and batch extraction.

use crate::envelope::{normalize, RawEntry, ResponseStatus, ServiceKind};
use crate::error::{ProtocolError, ProtocolResult};
use crate::nsu::Nsu;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::warn;

/// Upper bound on one decompressed document.
pub const MAX_DECOMPRESSED_SIZE: usize = 16 * 1024 * 1024;

/// Decodes a base64, gzip-compressed entry into raw bytes.
///
/// Whitespace inside the base64 text is ignored. Payloads larger than
/// [`MAX_DECOMPRESSED_SIZE`] are refused.
pub fn decode_doc_zip(content: &str) -> ProtocolResult<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let compressed = STANDARD.decode(compact.as_bytes())?;

    let mut out = Vec::new();
    let limit = MAX_DECOMPRESSED_SIZE as u64 + 1;
    GzDecoder::new(compressed.as_slice())
        .take(limit)
        .read_to_end(&mut out)?;
    if out.len() > MAX_DECOMPRESSED_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            limit: MAX_DECOMPRESSED_SIZE,
        });
    }
    Ok(out)
}

/// One successfully decoded batch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Sequence number of the entry.
    pub nsu: Nsu,
    /// Schema tag or document type, when reported.
    pub schema: Option<String>,
    /// Document key reported by the service, when reported.
    pub key_hint: Option<String>,
    /// Decompressed document bytes.
    pub payload: Vec<u8>,
}

/// An entry that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    /// The entry's sequence text, when there was one.
    pub nsu: Option<String>,
    /// What went wrong.
    pub reason: String,
}

/// Lazily decodes a batch, one entry at a time.
///
/// Failing entries are logged and yielded as `Err`; they never stop the
/// iteration.
#[derive(Debug)]
pub struct Extraction {
    entries: std::vec::IntoIter<RawEntry>,
}

impl Extraction {
    /// Wraps the entries of a normalized envelope.
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }

    fn decode(entry: RawEntry) -> Result<ExtractedDocument, DecodeFailure> {
        let nsu = Nsu::parse(&entry.nsu).map_err(|e| DecodeFailure {
            nsu: (!entry.nsu.is_empty()).then(|| entry.nsu.clone()),
            reason: e.to_string(),
        })?;
        let payload = decode_doc_zip(&entry.content).map_err(|e| DecodeFailure {
            nsu: Some(entry.nsu.clone()),
            reason: e.to_string(),
        })?;
        Ok(ExtractedDocument {
            nsu,
            schema: entry.schema,
            key_hint: entry.key_hint,
            payload,
        })
    }
}

impl Iterator for Extraction {
    type Item = Result<ExtractedDocument, DecodeFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        let result = Self::decode(entry);
        if let Err(failure) = &result {
            warn!(nsu = ?failure.nsu, reason = %failure.reason, "skipping undecodable entry");
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

/// The decoded result of one distribution call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    /// Classification of the response.
    pub status: ResponseStatus,
    /// HTTP status of the response.
    pub http_status: u16,
    /// Reason code from the service.
    pub code: String,
    /// Reason text from the service.
    pub message: String,
    /// Successfully decoded entries, in service order.
    pub documents: Vec<ExtractedDocument>,
    /// Entries that failed to decode.
    pub failures: Vec<DecodeFailure>,
    /// Number of entries the response carried.
    pub entry_count: usize,
    /// Highest sequence covered by the batch, when reported.
    pub last_nsu: Option<Nsu>,
    /// Highest sequence available at the service, when reported.
    pub max_nsu: Option<Nsu>,
}

impl PollResult {
    /// Highest sequence among decoded entries.
    #[must_use]
    pub fn highest_consumed(&self) -> Option<Nsu> {
        self.documents.iter().map(|d| d.nsu).max()
    }

    /// True when more sequences are likely available beyond this batch.
    ///
    /// NF-e reports this through `ultNSU < maxNSU`. The national NFS-e
    /// service reports neither, so any batch that moved the cursor may have
    /// a successor.
    #[must_use]
    pub fn has_more(&self) -> bool {
        match (self.last_nsu, self.max_nsu) {
            (Some(last), Some(max)) => last < max,
            (None, None) => {
                self.status == ResponseStatus::Batch && self.highest_consumed().is_some()
            }
            _ => false,
        }
    }
}

/// Normalizes a response and decodes all its entries.
pub fn extract(kind: ServiceKind, http_status: u16, body: &[u8]) -> PollResult {
    let (envelope, error) = normalize(kind, http_status, body);
    if let Some(error) = &error {
        warn!(http_status, %error, "response did not match any known envelope");
    }

    let entry_count = envelope.entries.len();
    let mut documents = Vec::with_capacity(entry_count);
    let mut failures = Vec::new();
    for item in Extraction::new(envelope.entries) {
        match item {
            Ok(doc) => documents.push(doc),
            Err(failure) => failures.push(failure),
        }
    }

    PollResult {
        status: envelope.status,
        http_status,
        code: envelope.code,
        message: envelope.message,
        documents,
        failures,
        entry_count,
        last_nsu: envelope.last_nsu,
        max_nsu: envelope.max_nsu,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn doc_zip(text: &str) -> String {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        STANDARD.encode(enc.finish().unwrap())
    }

    #[test]
    fn decodes_gzip_base64() {
        let encoded = doc_zip("<resNFe/>");
        assert_eq!(decode_doc_zip(&encoded).unwrap(), b"<resNFe/>");
    }

    #[test]
    fn whitespace_in_base64_is_ignored() {
        let encoded = doc_zip("<resNFe>abc</resNFe>");
        let (a, b) = encoded.split_at(8);
        let wrapped = format!("\n  {a}\r\n  {b}\n");
        assert_eq!(decode_doc_zip(&wrapped).unwrap(), b"<resNFe>abc</resNFe>");
    }

    #[test]
    fn bad_base64_and_bad_gzip_fail() {
        assert!(matches!(
            decode_doc_zip("!!!not base64!!!"),
            Err(ProtocolError::Base64(_))
        ));
        let not_gzip = STANDARD.encode(b"plain text, no gzip header");
        assert!(matches!(
            decode_doc_zip(&not_gzip),
            Err(ProtocolError::Decompress(_))
        ));
    }

    #[test]
    fn extraction_skips_failures_and_keeps_order() {
        let entries = vec![
            RawEntry {
                nsu: "000000000000001".into(),
                schema: None,
                key_hint: None,
                content: doc_zip("<a/>"),
            },
            RawEntry {
                nsu: "000000000000002".into(),
                schema: None,
                key_hint: None,
                content: "%%%".into(),
            },
            RawEntry {
                nsu: "000000000000003".into(),
                schema: None,
                key_hint: None,
                content: doc_zip("<c/>"),
            },
        ];
        let results: Vec<_> = Extraction::new(entries).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].as_ref().unwrap_err().nsu.as_deref(),
            Some("000000000000002")
        );
        assert_eq!(results[2].as_ref().unwrap().payload, b"<c/>");
    }

    #[test]
    fn extract_reports_highest_consumed_and_more() {
        let body = format!(
            "<retDistDFeInt><cStat>138</cStat><xMotivo>ok</xMotivo>\
             <ultNSU>000000000000005</ultNSU><maxNSU>000000000000010</maxNSU>\
             <loteDistDFeInt>\
             <docZip NSU=\"000000000000004\" schema=\"resNFe_v1.01\">{}</docZip>\
             <docZip NSU=\"000000000000005\" schema=\"resNFe_v1.01\">broken</docZip>\
             </loteDistDFeInt></retDistDFeInt>",
            doc_zip("<resNFe/>")
        );
        let result = extract(ServiceKind::Nfe, 200, body.as_bytes());
        assert_eq!(result.status, ResponseStatus::Batch);
        assert_eq!(result.entry_count, 2);
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.highest_consumed(), Some(Nsu::new(4).unwrap()));
        assert!(result.has_more());
    }
}
