//! Credential command implementation.

use super::{parse_identity, CommandResult};
use dfesync_protocol::{Nsu, RegionCode, ServiceKind};
use dfesync_store::{Credential, Passphrase, Store};
use serde::Serialize;
use std::path::PathBuf;

/// Arguments of `credential add`.
#[derive(Debug)]
pub struct AddArgs {
    /// CNPJ or CPF.
    pub identity: String,
    /// PKCS#12 certificate file.
    pub certificate: PathBuf,
    /// Certificate passphrase.
    pub passphrase: String,
    /// Two-digit state code.
    pub region: String,
    /// Distribution service.
    pub service: ServiceKind,
    /// Optional display name.
    pub label: Option<String>,
}

/// One row of `credential list`.
#[derive(Debug, Serialize)]
pub struct CredentialView {
    /// CNPJ or CPF.
    pub identity: String,
    /// Distribution service.
    pub service: ServiceKind,
    /// State code.
    pub region: String,
    /// Certificate file.
    pub certificate: PathBuf,
    /// Display name.
    pub label: Option<String>,
    /// Current cursor.
    pub cursor: Nsu,
}

impl CredentialView {
    fn new(store: &Store, credential: &Credential) -> Self {
        Self {
            identity: credential.identity.to_string(),
            service: credential.service,
            region: credential.region.to_string(),
            certificate: credential.certificate_path.clone(),
            label: credential.label.clone(),
            cursor: store.cursors().current(&credential.identity),
        }
    }
}

/// Registers or replaces a credential.
pub fn add(store: &Store, args: AddArgs) -> CommandResult<CredentialView> {
    let identity = parse_identity(&args.identity)?;
    let region = RegionCode::parse(&args.region)?;
    if !args.certificate.is_file() {
        return Err(format!("certificate {} not found", args.certificate.display()).into());
    }
    if args.passphrase.is_empty() {
        return Err("certificate passphrase is empty".into());
    }

    let mut credential = Credential::new(
        identity,
        args.certificate,
        Passphrase::new(args.passphrase),
        region,
    )
    .with_service(args.service);
    if let Some(label) = args.label {
        credential = credential.with_label(label);
    }
    store.credentials().register(credential.clone())?;
    Ok(CredentialView::new(store, &credential))
}

/// Removes a credential with its cursor and cooldown. Returns false if it
/// was not registered.
pub fn remove(store: &Store, identity: &str) -> CommandResult<bool> {
    let identity = parse_identity(identity)?;
    Ok(store.remove_credential(&identity)?.is_some())
}

/// Every registered credential.
pub fn list(store: &Store) -> Vec<CredentialView> {
    store
        .credentials()
        .list()
        .iter()
        .map(|credential| CredentialView::new(store, credential))
        .collect()
}

/// Text rendering of [`list`].
pub fn print_list(views: &[CredentialView]) {
    if views.is_empty() {
        println!("No credentials registered");
        return;
    }
    for view in views {
        println!(
            "{}  {:<13} region {}  cursor {}  {}",
            view.identity,
            service_name(view.service),
            view.region,
            view.cursor,
            view.label.as_deref().unwrap_or("")
        );
    }
}

pub(crate) fn service_name(service: ServiceKind) -> &'static str {
    match service {
        ServiceKind::Nfe => "nfe",
        ServiceKind::NfseNational => "nfse-national",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_testkit::RECIPIENT_CNPJ;
    use tempfile::TempDir;

    fn args(dir: &TempDir) -> AddArgs {
        let certificate = dir.path().join("cert.pfx");
        std::fs::write(&certificate, b"pfx").unwrap();
        AddArgs {
            identity: RECIPIENT_CNPJ.into(),
            certificate,
            passphrase: "secret".into(),
            region: "35".into(),
            service: ServiceKind::Nfe,
            label: Some("Head office".into()),
        }
    }

    #[test]
    fn add_list_remove() {
        let dir = TempDir::new().unwrap();
        let store = Store::in_memory().unwrap();

        let view = add(&store, args(&dir)).unwrap();
        assert_eq!(view.identity, RECIPIENT_CNPJ);
        assert_eq!(view.cursor, Nsu::ZERO);

        let views = list(&store);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].label.as_deref(), Some("Head office"));

        assert!(remove(&store, RECIPIENT_CNPJ).unwrap());
        assert!(!remove(&store, RECIPIENT_CNPJ).unwrap());
        assert!(list(&store).is_empty());
    }

    #[test]
    fn add_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let store = Store::in_memory().unwrap();

        let mut missing = args(&dir);
        missing.certificate = dir.path().join("missing.pfx");
        assert!(add(&store, missing).is_err());

        let mut bad_region = args(&dir);
        bad_region.region = "99".into();
        assert!(add(&store, bad_region).is_err());

        let mut bad_identity = args(&dir);
        bad_identity.identity = "123".into();
        assert!(add(&store, bad_identity).is_err());

        assert!(store.credentials().is_empty());
    }

    #[test]
    fn list_json_hides_passphrase() {
        let dir = TempDir::new().unwrap();
        let store = Store::in_memory().unwrap();
        add(&store, args(&dir)).unwrap();

        let json = serde_json::to_string(&list(&store)).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"service\":\"nfe\""));
    }
}
