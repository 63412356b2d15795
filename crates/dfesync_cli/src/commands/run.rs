//! Run command implementation.

use super::CommandResult;
use crate::output::OutputFormat;
use dfesync_engine::{CredentialStatus, EngineConfig, HttpSessionFactory, SyncEngine};
use dfesync_store::Store;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds an engine that talks to the real services over mutual TLS.
pub fn engine(store: Store, config: EngineConfig) -> SyncEngine {
    let sessions = HttpSessionFactory::new(config.endpoints.clone(), config.request_timeout);
    SyncEngine::new(Arc::new(store), Arc::new(sessions), config)
}

/// Runs every credential until Ctrl-C, then shuts down gracefully.
pub async fn run(store: Store, config: EngineConfig, format: OutputFormat) -> CommandResult<()> {
    let engine = engine(store, config);
    let workers = engine.start();
    if workers == 0 {
        warn!("no credentials registered, nothing to do");
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, finishing in-flight cycles");
    engine.shutdown().await;

    format.emit(&engine.status(), |statuses| print_status(statuses))?;
    Ok(())
}

/// Text rendering of status board entries.
pub fn print_status(statuses: &[CredentialStatus]) {
    for status in statuses {
        let cursor = status
            .cursor
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        println!(
            "{}  cursor {}  cycles {}  stored {}  throttles {}  rejections {}  transport errors {}{}",
            status.identity,
            cursor,
            status.cycles,
            status.documents_stored,
            status.throttles,
            status.rejections,
            status.transport_errors,
            if status.parked { "  PARKED" } else { "" }
        );
        if let Some(detail) = &status.last_detail {
            println!("  last: {detail}");
        }
    }
}
