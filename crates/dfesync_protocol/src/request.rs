//! Distribution request building.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{DocumentKey, Environment, RegionCode, TaxId};
use crate::nsu::Nsu;

/// Namespace of the `distDFeInt` message.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Namespace of the distribution web service.
pub const WSDL_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe";

/// `action` parameter of the SOAP 1.2 content type.
pub const SOAP_ACTION: &str =
    "http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe/nfeDistDFeInteresse";

/// Layout version of the distribution message.
pub const DIST_VERSION: &str = "1.01";

/// What a request asks the service for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionQuery {
    /// Everything newer than the given cursor.
    Since(Nsu),
    /// One document by its key.
    Key(DocumentKey),
}

/// One distribution request for one taxpayer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionRequest {
    /// Target environment.
    pub environment: Environment,
    /// Routing region of the requester.
    pub region: RegionCode,
    /// Taxpayer whose documents are requested.
    pub tax_id: TaxId,
    /// The query.
    pub query: DistributionQuery,
}

impl DistributionRequest {
    /// Requests everything after `cursor`.
    #[must_use]
    pub fn since(environment: Environment, region: RegionCode, tax_id: TaxId, cursor: Nsu) -> Self {
        Self {
            environment,
            region,
            tax_id,
            query: DistributionQuery::Since(cursor),
        }
    }

    /// Requests one document by key.
    #[must_use]
    pub fn by_key(
        environment: Environment,
        region: RegionCode,
        tax_id: TaxId,
        key: DocumentKey,
    ) -> Self {
        Self {
            environment,
            region,
            tax_id,
            query: DistributionQuery::Key(key),
        }
    }

    /// Returns the cursor this request was built from, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<Nsu> {
        match &self.query {
            DistributionQuery::Since(nsu) => Some(*nsu),
            DistributionQuery::Key(_) => None,
        }
    }

    /// Builds the `distDFeInt` message.
    #[must_use]
    pub fn dist_message(&self) -> String {
        let query = match &self.query {
            DistributionQuery::Since(nsu) => format!("<distNSU><ultNSU>{nsu}</ultNSU></distNSU>"),
            DistributionQuery::Key(key) => {
                format!("<consChNFe><chNFe>{key}</chNFe></consChNFe>")
            }
        };
        format!(
            "<distDFeInt xmlns=\"{NFE_NAMESPACE}\" versao=\"{DIST_VERSION}\">\
             <tpAmb>{}</tpAmb><cUFAutor>{}</cUFAutor><{tag}>{}</{tag}>{query}</distDFeInt>",
            self.environment.code(),
            self.region,
            self.tax_id,
            tag = self.tax_id.tag(),
        )
    }

    /// Wraps the message in the SOAP 1.2 envelope the NF-e service expects.
    #[must_use]
    pub fn soap_envelope(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <soap12:Envelope xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
             xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\" \
             xmlns:soap12=\"http://www.w3.org/2003/05/soap-envelope\">\
             <soap12:Body><nfeDistDFeInteresse xmlns=\"{WSDL_NAMESPACE}\">\
             <nfeDadosMsg>{}</nfeDadosMsg></nfeDistDFeInteresse></soap12:Body></soap12:Envelope>",
            self.dist_message()
        )
    }

    /// Builds the path and query of the national NFS-e REST endpoint.
    ///
    /// The national service lists entries starting at the NSU in the path,
    /// so the path carries the first sequence after the cursor.
    ///
    /// # Errors
    ///
    /// The national service has no by-key distribution query.
    pub fn nfse_path(&self) -> ProtocolResult<String> {
        match &self.query {
            DistributionQuery::Since(nsu) => Ok(format!(
                "/contribuintes/DFe/{}?cnpjConsulta={}&lote=true",
                nsu.value().saturating_add(1),
                self.tax_id
            )),
            DistributionQuery::Key(_) => Err(ProtocolError::Unsupported(
                "NFS-e distribution cannot be queried by key".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlNode;

    fn request(query: DistributionQuery) -> DistributionRequest {
        DistributionRequest {
            environment: Environment::Homologation,
            region: RegionCode::new(35).unwrap(),
            tax_id: TaxId::parse("12345678000190").unwrap(),
            query,
        }
    }

    #[test]
    fn envelope_carries_cursor_and_identity() {
        let req = request(DistributionQuery::Since(Nsu::new(12).unwrap()));
        let root = XmlNode::parse(&req.soap_envelope()).unwrap();

        let dist = root.find("distDFeInt").unwrap();
        assert_eq!(dist.attr("versao"), Some(DIST_VERSION));
        assert_eq!(dist.child_text("tpAmb"), Some("2"));
        assert_eq!(dist.child_text("cUFAutor"), Some("35"));
        assert_eq!(dist.child_text("CNPJ"), Some("12345678000190"));
        assert_eq!(
            dist.path_text(&["distNSU", "ultNSU"]),
            Some("000000000000012")
        );
    }

    #[test]
    fn key_query_uses_cons_ch_nfe() {
        let key = DocumentKey::parse("35240112345678000190550010000012341000012345").unwrap();
        let req = request(DistributionQuery::Key(key.clone()));
        let root = XmlNode::parse(&req.soap_envelope()).unwrap();
        assert_eq!(
            root.find("consChNFe").and_then(|n| n.child_text("chNFe")),
            Some(key.as_str())
        );
        assert!(req.cursor().is_none());
        assert!(req.nfse_path().is_err());
    }

    #[test]
    fn cpf_uses_its_own_tag() {
        let mut req = request(DistributionQuery::Since(Nsu::ZERO));
        req.tax_id = TaxId::parse("12345678909").unwrap();
        assert!(req.dist_message().contains("<CPF>12345678909</CPF>"));
    }

    #[test]
    fn nfse_path_starts_after_cursor() {
        let req = request(DistributionQuery::Since(Nsu::new(40).unwrap()));
        assert_eq!(
            req.nfse_path().unwrap(),
            "/contribuintes/DFe/41?cnpjConsulta=12345678000190&lote=true"
        );
    }
}
