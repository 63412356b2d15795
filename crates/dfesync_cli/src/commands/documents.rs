//! Documents command implementation.

use super::{parse_identity, require_credential, CommandResult};
use dfesync_protocol::{Completeness, DocumentKey, DocumentKind, Nsu};
use dfesync_store::{DocumentRecord, Store};
use serde::Serialize;

/// One row of `documents list`.
#[derive(Debug, Serialize)]
pub struct DocumentRow {
    /// Access key or event identifier.
    pub key: String,
    /// Invoice or event.
    pub kind: DocumentKind,
    /// SUMMARY or COMPLETE.
    pub completeness: Completeness,
    /// Sequence number that delivered the latest version.
    pub nsu: Option<Nsu>,
    /// Document number.
    pub number: Option<String>,
    /// Issuer name.
    pub issuer_name: Option<String>,
    /// Issue timestamp as reported.
    pub issued_at: Option<String>,
    /// Total amount as reported.
    pub total: Option<String>,
}

impl From<DocumentRecord> for DocumentRow {
    fn from(record: DocumentRecord) -> Self {
        Self {
            key: record.key.to_string(),
            kind: record.kind,
            completeness: record.completeness,
            nsu: record.nsu,
            number: record.number,
            issuer_name: record.issuer_name,
            issued_at: record.issued_at,
            total: record.total,
        }
    }
}

/// Filters for `documents list`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListFilter {
    /// Only SUMMARY records.
    pub summaries_only: bool,
    /// Only invoices.
    pub invoices_only: bool,
}

/// Documents owned by `identity`, in distribution order.
pub fn list(store: &Store, identity: &str, filter: ListFilter) -> CommandResult<Vec<DocumentRow>> {
    let identity = parse_identity(identity)?;
    require_credential(store, &identity)?;
    Ok(store
        .documents()
        .list_by_credential(&identity)
        .into_iter()
        .filter(|r| !filter.summaries_only || r.completeness == Completeness::Summary)
        .filter(|r| !filter.invoices_only || r.kind == DocumentKind::Invoice)
        .map(DocumentRow::from)
        .collect())
}

/// Text rendering of [`list`].
pub fn print_list(rows: &[DocumentRow]) {
    if rows.is_empty() {
        println!("No documents");
        return;
    }
    for row in rows {
        println!(
            "{}  {:<8} {:<7} {:>10}  {}",
            row.key,
            row.completeness,
            match row.kind {
                DocumentKind::Invoice => "invoice",
                DocumentKind::Event => "event",
            },
            row.number.as_deref().unwrap_or("-"),
            row.issuer_name.as_deref().unwrap_or("")
        );
    }
    println!("{} document(s)", rows.len());
}

/// The full record of `key`; the payload is dropped unless asked for.
pub fn show(store: &Store, key: &str, with_payload: bool) -> CommandResult<DocumentRecord> {
    let key = DocumentKey::parse(key)?;
    let mut record = store
        .documents()
        .get(&key)?
        .ok_or_else(|| format!("no document with key {key}"))?;
    if !with_payload {
        record.payload = None;
    }
    Ok(record)
}

/// Text rendering of [`show`].
pub fn print_record(record: &DocumentRecord) {
    let field = |name: &str, value: Option<&str>| {
        if let Some(value) = value {
            println!("  {name:<13}{value}");
        }
    };
    println!("{}", record.key);
    println!("  {:<13}{}", "owner", record.owner);
    println!("  {:<13}{}", "completeness", record.completeness);
    field("nsu", record.nsu.map(|n| n.to_string()).as_deref());
    field("schema", record.schema.as_deref());
    field("number", record.number.as_deref());
    field("issuer", record.issuer_tax_id.as_deref());
    field("issuer name", record.issuer_name.as_deref());
    field("issued at", record.issued_at.as_deref());
    field("total", record.total.as_deref());
    field("event type", record.event_type.as_deref());
    println!("  {:<13}{}", "updated", record.touched_at.to_rfc3339());
    if let Some(payload) = &record.payload {
        println!();
        println!("{payload}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dfesync_protocol::parse_document;
    use dfesync_testkit::{nfe_key, nfe_proc, register, res_nfe, RECIPIENT_CNPJ};

    fn store_document(store: &Store, xml: &str) {
        let meta = parse_document(xml.as_bytes(), None).unwrap();
        let complete = meta.completeness == Completeness::Complete;
        let mut record =
            DocumentRecord::from_meta(meta, dfesync_testkit::tax_id(RECIPIENT_CNPJ), Utc::now());
        if complete {
            record = record.with_payload(xml);
        }
        store.documents().upsert(record).unwrap();
    }

    #[test]
    fn list_and_filter() {
        let store = Store::in_memory().unwrap();
        register(&store, RECIPIENT_CNPJ);
        store_document(&store, &res_nfe(&nfe_key(1), "ACME LTDA"));
        store_document(&store, &nfe_proc(&nfe_key(2), "ACME LTDA"));

        let all = list(&store, RECIPIENT_CNPJ, ListFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let pending = list(
            &store,
            RECIPIENT_CNPJ,
            ListFilter {
                summaries_only: true,
                invoices_only: true,
            },
        )
        .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, nfe_key(1));
    }

    #[test]
    fn show_hides_payload_by_default() {
        let store = Store::in_memory().unwrap();
        register(&store, RECIPIENT_CNPJ);
        store_document(&store, &nfe_proc(&nfe_key(2), "ACME LTDA"));

        let record = show(&store, &nfe_key(2), false).unwrap();
        assert!(record.payload.is_none());
        let record = show(&store, &nfe_key(2), true).unwrap();
        assert!(record.payload.unwrap().contains("nfeProc"));

        assert!(show(&store, &nfe_key(3), false).is_err());
        assert!(show(&store, "not-a-key", false).is_err());
    }
}
