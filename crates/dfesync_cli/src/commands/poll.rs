//! Poll and fetch command implementations.

use super::{parse_identity, run, CommandResult};
use crate::output::OutputFormat;
use dfesync_engine::{EngineConfig, FetchReport};
use dfesync_store::Store;
use serde::Serialize;

#[derive(Serialize)]
struct PollView {
    identity: String,
    outcome: String,
    detail: String,
    cursor: String,
}

/// Runs one cycle for `identity`.
pub async fn poll(
    store: Store,
    config: EngineConfig,
    identity: &str,
    format: OutputFormat,
) -> CommandResult<()> {
    let identity = parse_identity(identity)?;
    let engine = run::engine(store, config);
    let outcome = engine.poll_once(&identity).await?;

    let view = PollView {
        identity: identity.to_string(),
        outcome: outcome.name().to_string(),
        detail: outcome.to_string(),
        cursor: engine.store().cursors().current(&identity).to_string(),
    };
    format.emit(&view, |view| {
        println!("{}  {}  cursor {}", view.identity, view.detail, view.cursor);
    })?;
    Ok(())
}

#[derive(Serialize)]
struct FetchView {
    identity: String,
    requested: usize,
    upgraded: usize,
    unavailable: usize,
    failed: usize,
}

/// Requests complete versions of up to `limit` summary invoices.
pub async fn fetch_complete(
    store: Store,
    config: EngineConfig,
    identity: &str,
    limit: usize,
    format: OutputFormat,
) -> CommandResult<()> {
    let identity = parse_identity(identity)?;
    let engine = run::engine(store, config);
    let FetchReport {
        requested,
        upgraded,
        unavailable,
        failed,
    } = engine.fetch_pending_complete(&identity, limit).await?;

    let view = FetchView {
        identity: identity.to_string(),
        requested,
        upgraded,
        unavailable,
        failed,
    };
    format.emit(&view, |view| {
        println!(
            "{}  requested {}  upgraded {}  unavailable {}  failed {}",
            view.identity, view.requested, view.upgraded, view.unavailable, view.failed
        );
    })?;
    Ok(())
}
