//! Metadata parsing for decoded fiscal documents.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::DocumentKey;
use crate::xml::XmlNode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two-stage completeness lifecycle of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    /// Lightweight notification; no full payload.
    Summary,
    /// The full authorized document.
    Complete,
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summary => f.write_str("SUMMARY"),
            Self::Complete => f.write_str("COMPLETE"),
        }
    }
}

/// Invoice or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// An invoice (NF-e or NFS-e).
    Invoice,
    /// An event attached to an invoice (cancellation, acknowledgment, ...).
    Event,
}

/// Indexed fields of one decoded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Unique document key.
    pub key: DocumentKey,
    /// Invoice or event.
    pub kind: DocumentKind,
    /// Summary or complete.
    pub completeness: Completeness,
    /// Issuer (or event author) CNPJ/CPF digits.
    pub issuer_tax_id: Option<String>,
    /// Issuer legal name.
    pub issuer_name: Option<String>,
    /// Document number, falling back to the one embedded in the key.
    pub number: Option<String>,
    /// Issue or event timestamp as sent.
    pub issued_at: Option<String>,
    /// Total amount as sent.
    pub total: Option<String>,
    /// Six-digit event type code, for events.
    pub event_type: Option<String>,
}

/// Classifies a decoded payload by its root element and extracts metadata.
///
/// `key_hint` is used when the document itself does not carry a readable
/// key (the national NFS-e service reports the key next to the entry).
pub fn parse_document(payload: &[u8], key_hint: Option<&str>) -> ProtocolResult<DocumentMeta> {
    let text = std::str::from_utf8(payload)?;
    let root = XmlNode::parse(text)?;

    let meta = match root.name.as_str() {
        "resNFe" => summary_invoice(&root, key_hint)?,
        "nfeProc" | "NFe" => complete_invoice(&root, key_hint)?,
        "resEvento" => nfe_event(&root, &root, Completeness::Summary, key_hint)?,
        "procEventoNFe" | "eventoNFe" => {
            let inf = root.find("infEvento").ok_or(ProtocolError::MissingField("infEvento"))?;
            nfe_event(&root, inf, Completeness::Complete, key_hint)?
        }
        "NFSe" => nfse_invoice(&root, key_hint)?,
        "evento" | "procEventoNFSe" if root.find("infPedReg").is_some() => {
            nfse_event(&root, key_hint)?
        }
        other => return Err(ProtocolError::UnsupportedSchema(other.to_string())),
    };
    Ok(meta)
}

fn owned(text: Option<&str>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn tax_id_of(node: &XmlNode) -> Option<String> {
    owned(node.child_text("CNPJ").or_else(|| node.child_text("CPF")))
}

fn resolve_key(candidates: &[Option<&str>], key_hint: Option<&str>) -> ProtocolResult<DocumentKey> {
    candidates
        .iter()
        .copied()
        .chain(std::iter::once(key_hint))
        .flatten()
        .find_map(|c| DocumentKey::parse(c).ok())
        .ok_or(ProtocolError::MissingField("document key"))
}

fn summary_invoice(root: &XmlNode, key_hint: Option<&str>) -> ProtocolResult<DocumentMeta> {
    let key = resolve_key(&[root.child_text("chNFe")], key_hint)?;
    Ok(DocumentMeta {
        number: key.invoice_number(),
        kind: DocumentKind::Invoice,
        completeness: Completeness::Summary,
        issuer_tax_id: tax_id_of(root),
        issuer_name: owned(root.child_text("xNome")),
        issued_at: owned(root.child_text("dhEmi")),
        total: owned(root.child_text("vNF")),
        event_type: None,
        key,
    })
}

fn complete_invoice(root: &XmlNode, key_hint: Option<&str>) -> ProtocolResult<DocumentMeta> {
    let inf = root.find("infNFe").ok_or(ProtocolError::MissingField("infNFe"))?;
    let protocol_key = root.find("infProt").and_then(|p| p.child_text("chNFe"));
    let key = resolve_key(&[protocol_key, inf.attr("Id")], key_hint)?;

    let ide = inf.child("ide");
    let emit = inf.child("emit");
    let number = ide
        .and_then(|i| owned(i.child_text("nNF")))
        .or_else(|| key.invoice_number());
    let issued_at = ide.and_then(|i| owned(i.child_text("dhEmi").or_else(|| i.child_text("dEmi"))));

    Ok(DocumentMeta {
        kind: DocumentKind::Invoice,
        completeness: Completeness::Complete,
        issuer_tax_id: emit.and_then(tax_id_of),
        issuer_name: emit.and_then(|e| owned(e.child_text("xNome"))),
        number,
        issued_at,
        total: owned(inf.path_text(&["total", "ICMSTot", "vNF"])),
        event_type: None,
        key,
    })
}

fn nfe_event(
    root: &XmlNode,
    inf: &XmlNode,
    completeness: Completeness,
    key_hint: Option<&str>,
) -> ProtocolResult<DocumentMeta> {
    let event_type = owned(inf.child_text("tpEvento"));
    let sequence = inf
        .child_text("nSeqEvento")
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(1);

    let key = match inf.attr("Id").and_then(|id| DocumentKey::parse(id).ok()) {
        Some(key) => key,
        None => {
            let invoice = resolve_key(&[inf.child_text("chNFe")], key_hint)?;
            let event_type = event_type
                .as_deref()
                .ok_or(ProtocolError::MissingField("tpEvento"))?;
            DocumentKey::event(&invoice, event_type, sequence)?
        }
    };

    let issuer_name = owned(
        root.find("retEvento")
            .and_then(|r| r.find("xNome"))
            .map(|n| n.text.as_str()),
    );

    Ok(DocumentMeta {
        number: key.invoice_number(),
        kind: DocumentKind::Event,
        completeness,
        issuer_tax_id: tax_id_of(inf),
        issuer_name,
        issued_at: owned(inf.child_text("dhEvento")),
        total: None,
        event_type,
        key,
    })
}

fn nfse_invoice(root: &XmlNode, key_hint: Option<&str>) -> ProtocolResult<DocumentMeta> {
    let inf = root.find("infNFSe").ok_or(ProtocolError::MissingField("infNFSe"))?;
    let key = resolve_key(&[inf.attr("Id")], key_hint)?;
    let emit = inf.child("emit");
    let dps = inf.find("infDPS");

    Ok(DocumentMeta {
        kind: DocumentKind::Invoice,
        completeness: Completeness::Complete,
        issuer_tax_id: emit.and_then(tax_id_of),
        issuer_name: emit.and_then(|e| owned(e.child_text("xNome"))),
        number: owned(inf.child_text("nNFSe")).or_else(|| key.invoice_number()),
        issued_at: dps
            .and_then(|d| owned(d.child_text("dhEmi")))
            .or_else(|| owned(inf.child_text("dhProc"))),
        total: owned(inf.path_text(&["valores", "vLiq"]))
            .or_else(|| dps.and_then(|d| owned(d.path_text(&["valores", "vServPrest", "vServ"])))),
        event_type: None,
        key,
    })
}

fn nfse_event(root: &XmlNode, key_hint: Option<&str>) -> ProtocolResult<DocumentMeta> {
    let req = root.find("infPedReg").ok_or(ProtocolError::MissingField("infPedReg"))?;
    // the event detail is an element named after its type, e.g. <e101101>
    let event_type = req
        .children
        .iter()
        .filter_map(|c| c.name.strip_prefix('e'))
        .find(|t| t.len() == 6 && t.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string);

    let id_key = req
        .attr("Id")
        .map(|id| id.trim_start_matches("PRE"))
        .and_then(|id| DocumentKey::parse(id).ok());
    let key = match id_key {
        Some(key) => key,
        None => {
            let invoice = resolve_key(&[req.child_text("chNFSe")], key_hint)?;
            let event_type = event_type
                .as_deref()
                .ok_or(ProtocolError::MissingField("event type"))?;
            let sequence = req
                .child_text("nPedRegEvento")
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(1);
            DocumentKey::event(&invoice, event_type, sequence)?
        }
    };

    Ok(DocumentMeta {
        number: key.invoice_number(),
        kind: DocumentKind::Event,
        completeness: Completeness::Complete,
        issuer_tax_id: owned(req.child_text("CNPJAutor").or_else(|| req.child_text("CPFAutor"))),
        issuer_name: None,
        issued_at: owned(req.child_text("dhEvento")),
        total: None,
        event_type,
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "35240112345678000190550010000012341000012345";

    #[test]
    fn res_nfe_is_summary() {
        let xml = format!(
            "<resNFe xmlns=\"http://www.portalfiscal.inf.br/nfe\" versao=\"1.01\">\
             <chNFe>{KEY}</chNFe><CNPJ>12345678000190</CNPJ><xNome>ACME LTDA</xNome>\
             <dhEmi>2024-01-10T10:00:00-03:00</dhEmi><tpNF>1</tpNF><vNF>150.00</vNF>\
             <cSitNFe>1</cSitNFe></resNFe>"
        );
        let meta = parse_document(xml.as_bytes(), None).unwrap();
        assert_eq!(meta.key.as_str(), KEY);
        assert_eq!(meta.completeness, Completeness::Summary);
        assert_eq!(meta.kind, DocumentKind::Invoice);
        assert_eq!(meta.issuer_name.as_deref(), Some("ACME LTDA"));
        assert_eq!(meta.number.as_deref(), Some("1234"));
        assert_eq!(meta.total.as_deref(), Some("150.00"));
    }

    #[test]
    fn nfe_proc_is_complete() {
        let xml = format!(
            "<nfeProc versao=\"4.00\"><NFe><infNFe Id=\"NFe{KEY}\" versao=\"4.00\">\
             <ide><nNF>1234</nNF><dhEmi>2024-01-10T10:00:00-03:00</dhEmi></ide>\
             <emit><CNPJ>12345678000190</CNPJ><xNome>ACME LTDA</xNome></emit>\
             <total><ICMSTot><vNF>150.00</vNF></ICMSTot></total>\
             </infNFe></NFe><protNFe><infProt><chNFe>{KEY}</chNFe></infProt></protNFe></nfeProc>"
        );
        let meta = parse_document(xml.as_bytes(), None).unwrap();
        assert_eq!(meta.completeness, Completeness::Complete);
        assert_eq!(meta.issuer_tax_id.as_deref(), Some("12345678000190"));
        assert_eq!(meta.total.as_deref(), Some("150.00"));
    }

    #[test]
    fn res_evento_builds_event_key() {
        let xml = format!(
            "<resEvento><cOrgao>91</cOrgao><CNPJ>12345678000190</CNPJ><chNFe>{KEY}</chNFe>\
             <dhEvento>2024-01-11T09:00:00-03:00</dhEvento><tpEvento>110111</tpEvento>\
             <nSeqEvento>1</nSeqEvento></resEvento>"
        );
        let meta = parse_document(xml.as_bytes(), None).unwrap();
        assert_eq!(meta.kind, DocumentKind::Event);
        assert_eq!(meta.key.as_str(), format!("110111{KEY}01"));
        assert_eq!(meta.event_type.as_deref(), Some("110111"));
        assert_eq!(meta.number.as_deref(), Some("1234"));
    }

    #[test]
    fn proc_evento_uses_id_attribute() {
        let xml = format!(
            "<procEventoNFe><evento><infEvento Id=\"ID210210{KEY}01\">\
             <CNPJ>99999999000191</CNPJ><chNFe>{KEY}</chNFe><tpEvento>210210</tpEvento>\
             <nSeqEvento>1</nSeqEvento></infEvento></evento></procEventoNFe>"
        );
        let meta = parse_document(xml.as_bytes(), None).unwrap();
        assert_eq!(meta.completeness, Completeness::Complete);
        assert_eq!(meta.key.as_str(), format!("210210{KEY}01"));
    }

    #[test]
    fn nfse_uses_key_hint_when_id_is_missing() {
        let key50 = "35503082212345678000190000000000000124010000000001";
        let xml = "<NFSe xmlns=\"http://www.sped.fazenda.gov.br/nfse\"><infNFSe>\
             <nNFSe>12</nNFSe><emit><CNPJ>12345678000190</CNPJ><xNome>Servicos SA</xNome></emit>\
             <valores><vLiq>980.00</vLiq></valores></infNFSe></NFSe>";
        let meta = parse_document(xml.as_bytes(), Some(key50)).unwrap();
        assert_eq!(meta.key.as_str(), key50);
        assert_eq!(meta.number.as_deref(), Some("12"));
        assert_eq!(meta.total.as_deref(), Some("980.00"));
    }

    #[test]
    fn unknown_root_is_unsupported() {
        let err = parse_document(b"<invoice/>", None).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedSchema(name) if name == "invoice"));
    }
}
