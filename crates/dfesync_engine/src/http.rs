//! HTTP transport over mutual TLS.
//!
//! [`HttpSessionFactory`] turns a credential's PKCS#12 file into a
//! `reqwest` client that presents the certificate on every handshake. One
//! client per session, so connections are never pooled across credentials.

use crate::config::Endpoints;
use crate::error::{SyncError, SyncResult};
use crate::transport::{DistributionTransport, RawResponse, SessionFactory};
use async_trait::async_trait;
use dfesync_protocol::{DistributionRequest, ServiceKind, SOAP_ACTION};
use dfesync_store::Credential;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;

/// Opens mTLS sessions against the configured endpoints.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    endpoints: Endpoints,
    timeout: Duration,
}

impl HttpSessionFactory {
    /// Creates a factory; `timeout` bounds each request on the client side.
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self, credential: &Credential) -> SyncResult<Box<dyn DistributionTransport>> {
        let path = &credential.certificate_path;
        let der = tokio::fs::read(path).await.map_err(|e| {
            SyncError::credential(
                &credential.identity,
                format!("cannot read certificate {}: {e}", path.display()),
            )
        })?;
        let identity = reqwest::Identity::from_pkcs12_der(&der, credential.passphrase.expose())
            .map_err(|e| {
                SyncError::credential(&credential.identity, format!("certificate rejected: {e}"))
            })?;
        let client = reqwest::Client::builder()
            .identity(identity)
            .timeout(self.timeout)
            .build()
            .map_err(|e| {
                SyncError::credential(&credential.identity, format!("cannot build client: {e}"))
            })?;

        debug!(identity = %credential.identity, service = ?credential.service, "session opened");
        Ok(Box::new(HttpTransport::new(
            client,
            self.endpoints.clone(),
            credential.service,
        )))
    }
}

/// One credential's HTTP session.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoints: Endpoints,
    service: ServiceKind,
}

impl HttpTransport {
    /// Wraps an already configured client.
    pub fn new(client: reqwest::Client, endpoints: Endpoints, service: ServiceKind) -> Self {
        Self {
            client,
            endpoints,
            service,
        }
    }

    fn classify(error: reqwest::Error) -> SyncError {
        if error.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::transport_retryable(error.to_string())
        }
    }
}

#[async_trait]
impl DistributionTransport for HttpTransport {
    async fn distribute(&self, request: &DistributionRequest) -> SyncResult<RawResponse> {
        let builder = match self.service {
            ServiceKind::Nfe => self
                .client
                .post(&self.endpoints.nfe)
                .header(
                    CONTENT_TYPE,
                    format!("application/soap+xml; charset=utf-8; action=\"{SOAP_ACTION}\""),
                )
                .body(request.soap_envelope()),
            ServiceKind::NfseNational => {
                let url = format!("{}{}", self.endpoints.nfse, request.nfse_path()?);
                self.client.get(url).header(ACCEPT, "application/json")
            }
        };

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Self::classify)?;
        debug!(status, bytes = body.len(), "distribution response");
        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_protocol::{RegionCode, TaxId};
    use dfesync_store::Passphrase;

    fn credential(path: &std::path::Path) -> Credential {
        Credential::new(
            TaxId::parse("12345678000190").unwrap(),
            path,
            Passphrase::new("secret"),
            RegionCode::new(35).unwrap(),
        )
    }

    #[tokio::test]
    async fn missing_certificate_is_credential_error() {
        let factory = HttpSessionFactory::new(Endpoints::default(), Duration::from_secs(5));
        let result = factory
            .open(&credential(std::path::Path::new("/nonexistent/cert.pfx")))
            .await;
        match result {
            Err(SyncError::Credential { reason, .. }) => assert!(reason.contains("cannot read")),
            _ => panic!("expected credential error"),
        }
    }

    #[tokio::test]
    async fn garbage_certificate_is_credential_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cert.pfx");
        std::fs::write(&path, b"not a pkcs12 file").unwrap();

        let factory = HttpSessionFactory::new(Endpoints::default(), Duration::from_secs(5));
        assert!(matches!(
            factory.open(&credential(&path)).await,
            Err(SyncError::Credential { .. })
        ));
    }
}
