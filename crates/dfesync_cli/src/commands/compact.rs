//! Compact command implementation.

use super::CommandResult;
use dfesync_store::Store;
use std::path::Path;

/// Sizes of the log files before and after compaction.
#[derive(Debug, serde::Serialize)]
pub struct CompactStats {
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

/// Rewrites every log keeping only the latest record per key.
pub fn run(store: &Store, data_dir: &Path) -> CommandResult<CompactStats> {
    let bytes_before = logs_size(data_dir)?;
    store.compact()?;
    let bytes_after = logs_size(data_dir)?;
    Ok(CompactStats {
        bytes_before,
        bytes_after,
    })
}

/// Text rendering of [`CompactStats`].
pub fn print(stats: &CompactStats) {
    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        saved,
        if stats.bytes_before > 0 {
            saved as f64 / stats.bytes_before as f64 * 100.0
        } else {
            0.0
        }
    );
}

fn logs_size(data_dir: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        let is_log = entry.path().extension().is_some_and(|ext| ext == "log");
        if is_log {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_testkit::{nsu, register, RECIPIENT_CNPJ};
    use dfesync_store::StoreConfig;

    #[test]
    fn compaction_shrinks_rewritten_cursor_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_with_config(dir.path(), StoreConfig::default()).unwrap();
        let credential = register(&store, RECIPIENT_CNPJ);
        for value in 1..=50 {
            store.cursors().advance(&credential.identity, nsu(value)).unwrap();
        }

        let stats = run(&store, dir.path()).unwrap();
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(store.cursors().current(&credential.identity), nsu(50));
    }
}
