//! Response envelope normalization.
//!
//! Every service shape is reduced here to one [`DistributionEnvelope`]
//! before the poller looks at it. Nothing downstream branches on the
//! service family again.

use crate::error::ProtocolError;
use crate::nsu::Nsu;
use crate::xml::XmlNode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which distribution service a credential talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// NF-e `NFeDistribuicaoDFe` SOAP service.
    #[default]
    Nfe,
    /// National NFS-e REST distribution (`/contribuintes/DFe`).
    NfseNational,
}

/// Classification of a response, independent of service family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Documents were located (the batch may still be empty).
    Batch,
    /// The service has nothing newer than the cursor.
    Empty,
    /// The service asked the caller to slow down.
    Throttled,
    /// Any other application-level status.
    Rejected,
    /// The body matched no known envelope shape.
    Unparseable,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Batch => "batch",
            Self::Empty => "empty",
            Self::Throttled => "throttled",
            Self::Rejected => "rejected",
            Self::Unparseable => "unparseable",
        };
        f.write_str(s)
    }
}

/// One still-encoded batch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Sequence number as sent by the service.
    pub nsu: String,
    /// Schema tag or document type, when the service reports one.
    pub schema: Option<String>,
    /// Document key reported next to the entry, when the service reports one.
    pub key_hint: Option<String>,
    /// Base64 text of the compressed document.
    pub content: String,
}

/// A normalized distribution response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionEnvelope {
    /// Classification.
    pub status: ResponseStatus,
    /// Machine-readable reason code from the service.
    pub code: String,
    /// Human-readable reason text from the service.
    pub message: String,
    /// Highest sequence covered by this batch, when reported.
    pub last_nsu: Option<Nsu>,
    /// Highest sequence available at the service, when reported.
    pub max_nsu: Option<Nsu>,
    /// Entries in service order.
    pub entries: Vec<RawEntry>,
}

impl DistributionEnvelope {
    fn status_only(status: ResponseStatus, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            last_nsu: None,
            max_nsu: None,
            entries: Vec::new(),
        }
    }

    fn unparseable(reason: impl Into<String>) -> Self {
        Self::status_only(ResponseStatus::Unparseable, "", reason)
    }
}

/// NF-e status codes.
mod nfe_status {
    pub const NO_DOCUMENTS: &str = "137";
    pub const DOCUMENTS_FOUND: &str = "138";
    pub const MISUSE: &str = "656";
}

/// HTTP status used by rate limiting front-ends.
const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// Normalizes one response body.
///
/// Unknown or unparseable shapes produce an envelope with
/// [`ResponseStatus::Unparseable`] whose `message` explains why; the
/// second element carries the underlying error when there was one.
pub fn normalize(
    kind: ServiceKind,
    http_status: u16,
    body: &[u8],
) -> (DistributionEnvelope, Option<ProtocolError>) {
    match kind {
        ServiceKind::Nfe => normalize_nfe(http_status, body),
        ServiceKind::NfseNational => normalize_nfse(http_status, body),
    }
}

fn normalize_nfe(http_status: u16, body: &[u8]) -> (DistributionEnvelope, Option<ProtocolError>) {
    let text = String::from_utf8_lossy(body);
    let root = match XmlNode::parse(&text) {
        Ok(root) => root,
        Err(e) => {
            if http_status == HTTP_TOO_MANY_REQUESTS {
                return (throttled_by_http(), None);
            }
            return (DistributionEnvelope::unparseable(e.to_string()), Some(e));
        }
    };

    let Some(ret) = root.find("retDistDFeInt") else {
        if let Some(fault) = root.find("Fault") {
            let code = fault
                .find("Value")
                .or_else(|| fault.find("faultcode"))
                .map(|n| n.text.clone())
                .unwrap_or_else(|| "soap:Fault".into());
            let message = fault
                .find("Text")
                .or_else(|| fault.find("faultstring"))
                .map(|n| n.text.clone())
                .unwrap_or_default();
            return (
                DistributionEnvelope::status_only(ResponseStatus::Rejected, code, message),
                None,
            );
        }
        if http_status == HTTP_TOO_MANY_REQUESTS {
            return (throttled_by_http(), None);
        }
        return (
            DistributionEnvelope::unparseable(format!("no retDistDFeInt in <{}>", root.name)),
            None,
        );
    };

    let code = ret.child_text("cStat").unwrap_or_default().to_string();
    let message = ret.child_text("xMotivo").unwrap_or_default().to_string();
    let status = match code.as_str() {
        nfe_status::DOCUMENTS_FOUND => ResponseStatus::Batch,
        nfe_status::NO_DOCUMENTS => ResponseStatus::Empty,
        nfe_status::MISUSE => ResponseStatus::Throttled,
        "" => {
            return (
                DistributionEnvelope::unparseable("retDistDFeInt without cStat"),
                None,
            )
        }
        _ => ResponseStatus::Rejected,
    };

    // An unreadable ultNSU/maxNSU is treated as absent, never as zero.
    let last_nsu = ret.child_text("ultNSU").and_then(|t| Nsu::parse(t).ok());
    let max_nsu = ret.child_text("maxNSU").and_then(|t| Nsu::parse(t).ok());

    let entries = ret
        .child("loteDistDFeInt")
        .map(|lote| {
            lote.children_named("docZip")
                .map(|doc| RawEntry {
                    nsu: doc.attr("NSU").unwrap_or_default().to_string(),
                    schema: doc.attr("schema").map(str::to_string),
                    key_hint: None,
                    content: doc.text.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    (
        DistributionEnvelope {
            status,
            code,
            message,
            last_nsu,
            max_nsu,
            entries,
        },
        None,
    )
}

fn throttled_by_http() -> DistributionEnvelope {
    DistributionEnvelope::status_only(
        ResponseStatus::Throttled,
        HTTP_TOO_MANY_REQUESTS.to_string(),
        "too many requests",
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NationalResponse {
    status_processamento: Option<String>,
    #[serde(rename = "LoteDFe")]
    lote_dfe: Option<Vec<NationalEntry>>,
    erros: Option<Vec<NationalMessage>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NationalEntry {
    #[serde(rename = "NSU")]
    nsu: Option<serde_json::Value>,
    chave_acesso: Option<String>,
    tipo_documento: Option<String>,
    arquivo_xml: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NationalMessage {
    codigo: Option<String>,
    descricao: Option<String>,
}

fn normalize_nfse(http_status: u16, body: &[u8]) -> (DistributionEnvelope, Option<ProtocolError>) {
    if http_status == HTTP_TOO_MANY_REQUESTS {
        return (throttled_by_http(), None);
    }

    let response: NationalResponse = match serde_json::from_slice(body) {
        Ok(response) => response,
        Err(e) => {
            return (
                DistributionEnvelope::unparseable(e.to_string()),
                Some(ProtocolError::Json(e)),
            )
        }
    };

    let Some(state) = response.status_processamento else {
        return (
            DistributionEnvelope::unparseable("response without StatusProcessamento"),
            None,
        );
    };

    let first_error = response.erros.unwrap_or_default().into_iter().next();
    let (code, message) = match first_error {
        Some(err) => (
            err.codigo.unwrap_or_else(|| state.clone()),
            err.descricao.unwrap_or_default(),
        ),
        None => (state.clone(), String::new()),
    };

    let status = match state.as_str() {
        "DOCUMENTOS_LOCALIZADOS" => ResponseStatus::Batch,
        "NENHUM_DOCUMENTO_LOCALIZADO" => ResponseStatus::Empty,
        _ => ResponseStatus::Rejected,
    };

    let entries = response
        .lote_dfe
        .unwrap_or_default()
        .into_iter()
        .map(|entry| RawEntry {
            nsu: match entry.nsu {
                Some(serde_json::Value::Number(n)) => n.to_string(),
                Some(serde_json::Value::String(s)) => s,
                _ => String::new(),
            },
            schema: entry.tipo_documento,
            key_hint: entry.chave_acesso,
            content: entry.arquivo_xml.unwrap_or_default(),
        })
        .collect();

    (
        DistributionEnvelope {
            status,
            code,
            message,
            last_nsu: None,
            max_nsu: None,
            entries,
        },
        None,
    )
}
