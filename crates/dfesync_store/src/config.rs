//! Store configuration.

/// Configuration for opening a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync every appended record (safer but slower).
    pub sync_on_write: bool,

    /// Compact every log on open.
    pub compact_on_open: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            compact_on_open: false,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync every appended record.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to compact every log on open.
    #[must_use]
    pub const fn compact_on_open(mut self, value: bool) -> Self {
        self.compact_on_open = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_write);
        assert!(!config.compact_on_open);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .create_if_missing(false)
            .sync_on_write(false);
        assert!(!config.create_if_missing);
        assert!(!config.sync_on_write);
    }
}
