//! Response builders for both distribution services.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// Gzips and base64-encodes `xml` the way docZip entries are sent.
pub fn doc_zip(xml: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .expect("Failed to compress");
    STANDARD.encode(encoder.finish().expect("Failed to finish gzip"))
}

enum Content {
    Xml(String),
    Raw(String),
}

impl Content {
    fn encoded(&self) -> String {
        match self {
            Content::Xml(xml) => doc_zip(xml),
            Content::Raw(raw) => raw.clone(),
        }
    }
}

/// Builder for `retDistDFeInt` SOAP responses.
pub struct NfeResponse {
    status: String,
    motive: String,
    last_nsu: Option<u64>,
    max_nsu: Option<u64>,
    entries: Vec<(u64, String, Content)>,
}

impl NfeResponse {
    /// A `138` response covering up to `last` with `max` available.
    pub fn batch(last: u64, max: u64) -> Self {
        Self {
            status: "138".into(),
            motive: "Documento(s) localizado(s)".into(),
            last_nsu: Some(last),
            max_nsu: Some(max),
            entries: Vec::new(),
        }
    }

    /// A `137` response at `cursor`.
    pub fn empty(cursor: u64) -> Self {
        Self {
            status: "137".into(),
            motive: "Nenhum documento localizado".into(),
            last_nsu: Some(cursor),
            max_nsu: Some(cursor),
            entries: Vec::new(),
        }
    }

    /// Any other status.
    pub fn status(code: &str, motive: &str) -> Self {
        Self {
            status: code.into(),
            motive: motive.into(),
            last_nsu: None,
            max_nsu: None,
            entries: Vec::new(),
        }
    }

    /// Drops the `ultNSU`/`maxNSU` fields.
    pub fn without_max(mut self) -> Self {
        self.last_nsu = None;
        self.max_nsu = None;
        self
    }

    /// Adds a docZip entry.
    pub fn entry(mut self, nsu: u64, schema: &str, xml: &str) -> Self {
        self.entries
            .push((nsu, schema.into(), Content::Xml(xml.into())));
        self
    }

    /// Adds an entry whose content is not valid base64.
    pub fn corrupt_entry(mut self, nsu: u64) -> Self {
        self.entries
            .push((nsu, "resNFe_v1.01".into(), Content::Raw("@@not-base64@@".into())));
        self
    }

    /// Renders the SOAP 1.2 body.
    pub fn build(&self) -> Vec<u8> {
        let mut inner = format!(
            "<tpAmb>1</tpAmb><verAplic>1.7.6</verAplic><cStat>{}</cStat><xMotivo>{}</xMotivo>\
             <dhResp>2024-01-10T10:00:00-03:00</dhResp>",
            self.status, self.motive
        );
        if let Some(last) = self.last_nsu {
            inner.push_str(&format!("<ultNSU>{last:015}</ultNSU>"));
        }
        if let Some(max) = self.max_nsu {
            inner.push_str(&format!("<maxNSU>{max:015}</maxNSU>"));
        }
        if !self.entries.is_empty() {
            inner.push_str("<loteDistDFeInt>");
            for (nsu, schema, content) in &self.entries {
                inner.push_str(&format!(
                    "<docZip NSU=\"{nsu:015}\" schema=\"{schema}\">{}</docZip>",
                    content.encoded()
                ));
            }
            inner.push_str("</loteDistDFeInt>");
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <soap:Envelope xmlns:soap=\"http://www.w3.org/2003/05/soap-envelope\">\
             <soap:Body><nfeDistDFeInteresseResponse \
             xmlns=\"http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe\">\
             <nfeDistDFeInteresseResult>\
             <retDistDFeInt xmlns=\"http://www.portalfiscal.inf.br/nfe\" versao=\"1.01\">{inner}\
             </retDistDFeInt></nfeDistDFeInteresseResult></nfeDistDFeInteresseResponse>\
             </soap:Body></soap:Envelope>"
        )
        .into_bytes()
    }
}

/// Builder for national NFS-e JSON responses.
pub struct NfseResponse {
    status: String,
    entries: Vec<(u64, String, String, Content)>,
    errors: Vec<(String, String)>,
}

impl NfseResponse {
    /// `DOCUMENTOS_LOCALIZADOS`.
    pub fn batch() -> Self {
        Self {
            status: "DOCUMENTOS_LOCALIZADOS".into(),
            entries: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// `NENHUM_DOCUMENTO_LOCALIZADO`.
    pub fn empty() -> Self {
        Self {
            status: "NENHUM_DOCUMENTO_LOCALIZADO".into(),
            entries: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// `REJEICAO` with one error.
    pub fn rejected(code: &str, description: &str) -> Self {
        Self {
            status: "REJEICAO".into(),
            entries: Vec::new(),
            errors: vec![(code.into(), description.into())],
        }
    }

    /// Adds an entry.
    pub fn entry(mut self, nsu: u64, key: &str, kind: &str, xml: &str) -> Self {
        self.entries
            .push((nsu, key.into(), kind.into(), Content::Xml(xml.into())));
        self
    }

    /// Adds an entry whose content is not valid base64.
    pub fn corrupt_entry(mut self, nsu: u64, key: &str) -> Self {
        self.entries.push((
            nsu,
            key.into(),
            "NFSE".into(),
            Content::Raw("@@not-base64@@".into()),
        ));
        self
    }

    /// Renders the JSON body.
    pub fn build(&self) -> Vec<u8> {
        let lote: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|(nsu, key, kind, content)| {
                serde_json::json!({
                    "NSU": nsu,
                    "ChaveAcesso": key,
                    "TipoDocumento": kind,
                    "ArquivoXml": content.encoded(),
                    "DataHoraGeracao": "2024-01-10T10:00:00"
                })
            })
            .collect();
        let errors: Vec<serde_json::Value> = self
            .errors
            .iter()
            .map(|(code, description)| serde_json::json!({"Codigo": code, "Descricao": description}))
            .collect();
        serde_json::to_vec(&serde_json::json!({
            "StatusProcessamento": self.status,
            "LoteDFe": lote,
            "Alertas": [],
            "Erros": errors,
            "TipoAmbiente": "PRODUCAO",
            "VersaoAplicativo": "1.0.0",
            "DataHoraProcessamento": "2024-01-10T10:00:00"
        }))
        .expect("Failed to encode JSON")
    }
}
