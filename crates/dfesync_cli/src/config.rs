//! TOML configuration file.
//!
//! Every field is optional; whatever is set overrides the engine defaults.
//!
//! ```toml
//! data_dir = "/var/lib/dfesync"
//! environment = "homologation"
//! cooldown_window_secs = 3600
//! cycle_interval_secs = 3600
//! request_timeout_secs = 60
//! drain_limit = 50
//!
//! [backoff]
//! initial_secs = 60
//! max_secs = 900
//!
//! [endpoints]
//! nfe = "https://hom1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx"
//! nfse = "https://adn.producaorestrita.nfse.gov.br"
//! ```

use dfesync_engine::{EngineConfig, Endpoints, RetryConfig};
use dfesync_protocol::Environment;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Neither the command line nor the file names a data directory.
    #[error("no data directory: pass --data-dir or set data_dir in the configuration file")]
    MissingDataDir,
}

/// Backoff section.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BackoffSection {
    /// First delay after a throttle or transport failure.
    pub initial_secs: Option<u64>,
    /// Upper bound on the delay.
    pub max_secs: Option<u64>,
    /// Growth factor per consecutive failure.
    pub multiplier: Option<f64>,
    /// Randomize delays by up to 25%.
    pub jitter: Option<bool>,
}

/// Endpoint overrides.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EndpointsSection {
    /// NF-e SOAP endpoint.
    pub nfe: Option<String>,
    /// NFS-e API base URL.
    pub nfse: Option<String>,
}

/// Contents of the configuration file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Data directory.
    pub data_dir: Option<PathBuf>,
    /// `production` or `homologation`.
    pub environment: Option<Environment>,
    /// Cooldown after an EMPTY response.
    pub cooldown_window_secs: Option<u64>,
    /// Sleep between cycles.
    pub cycle_interval_secs: Option<u64>,
    /// Bound on one request.
    pub request_timeout_secs: Option<u64>,
    /// Delay before the single transport retry.
    pub transport_retry_delay_secs: Option<u64>,
    /// Batches per cycle.
    pub drain_limit: Option<u32>,
    /// Backoff settings.
    #[serde(default)]
    pub backoff: BackoffSection,
    /// Endpoint overrides.
    #[serde(default)]
    pub endpoints: EndpointsSection,
}

impl FileConfig {
    /// Reads `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlays the file on the engine defaults.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let environment = self.environment.unwrap_or_default();
        let mut config = EngineConfig::new(environment);

        if self.endpoints.nfe.is_some() || self.endpoints.nfse.is_some() {
            let defaults = Endpoints::for_environment(environment);
            config = config.with_endpoints(Endpoints {
                nfe: self.endpoints.nfe.clone().unwrap_or(defaults.nfe),
                nfse: self.endpoints.nfse.clone().unwrap_or(defaults.nfse),
            });
        }
        if let Some(secs) = self.cooldown_window_secs {
            config = config.with_cooldown_window(Duration::from_secs(secs));
        }
        if let Some(secs) = self.cycle_interval_secs {
            config = config.with_cycle_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.request_timeout_secs {
            if secs == 0 {
                return Err(ConfigError::Invalid("request_timeout_secs must be positive".into()));
            }
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.transport_retry_delay_secs {
            config = config.with_transport_retry_delay(Duration::from_secs(secs));
        }
        if let Some(limit) = self.drain_limit {
            config = config.with_drain_limit(limit);
        }
        let backoff = self.backoff_config(&config.backoff)?;
        config = config.with_backoff(backoff);

        Ok(config)
    }

    fn backoff_config(&self, defaults: &RetryConfig) -> Result<RetryConfig, ConfigError> {
        let section = &self.backoff;
        let initial = section
            .initial_secs
            .map_or(defaults.initial_delay, Duration::from_secs);
        let max = section.max_secs.map_or(defaults.max_delay, Duration::from_secs);
        if max < initial {
            return Err(ConfigError::Invalid(
                "backoff.max_secs is below backoff.initial_secs".into(),
            ));
        }

        let mut backoff = RetryConfig::new(initial, max)
            .with_backoff_multiplier(defaults.backoff_multiplier)
            .with_jitter(defaults.add_jitter);
        if let Some(multiplier) = section.multiplier {
            if !(multiplier >= 1.0 && multiplier.is_finite()) {
                return Err(ConfigError::Invalid("backoff.multiplier must be at least 1".into()));
            }
            backoff = backoff.with_backoff_multiplier(multiplier);
        }
        if let Some(jitter) = section.jitter {
            backoff = backoff.with_jitter(jitter);
        }
        Ok(backoff)
    }

    /// The data directory: the command line wins over the file.
    pub fn data_dir(&self, flag: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        flag.or_else(|| self.data_dir.clone())
            .ok_or(ConfigError::MissingDataDir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_keeps_defaults() {
        let file: FileConfig = toml::from_str("").unwrap();
        let config = file.engine_config().unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.cooldown_window, Duration::from_secs(3600));
        assert_eq!(config.drain_limit, 50);
        assert_eq!(config.backoff.initial_delay, Duration::from_secs(60));
    }

    #[test]
    fn overrides_apply() {
        let file: FileConfig = toml::from_str(
            r#"
            environment = "homologation"
            cycle_interval_secs = 600
            drain_limit = 5

            [backoff]
            initial_secs = 30
            max_secs = 120
            jitter = false

            [endpoints]
            nfse = "http://localhost:9000"
            "#,
        )
        .unwrap();
        let config = file.engine_config().unwrap();

        assert_eq!(config.environment, Environment::Homologation);
        assert_eq!(config.cycle_interval, Duration::from_secs(600));
        assert_eq!(config.drain_limit, 5);
        assert_eq!(config.backoff.max_delay, Duration::from_secs(120));
        assert!(!config.backoff.add_jitter);
        assert_eq!(config.endpoints.nfse, "http://localhost:9000");
        assert!(config.endpoints.nfe.starts_with("https://hom1."));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("cooldown = 5").is_err());
    }

    #[test]
    fn inverted_backoff_is_invalid() {
        let file: FileConfig = toml::from_str("[backoff]\ninitial_secs = 600\nmax_secs = 60").unwrap();
        assert!(matches!(file.engine_config(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn data_dir_flag_wins() {
        let file: FileConfig = toml::from_str("data_dir = \"/from/file\"").unwrap();
        assert_eq!(
            file.data_dir(Some(PathBuf::from("/from/flag"))).unwrap(),
            PathBuf::from("/from/flag")
        );
        assert_eq!(file.data_dir(None).unwrap(), PathBuf::from("/from/file"));
        assert!(matches!(
            FileConfig::default().data_dir(None),
            Err(ConfigError::MissingDataDir)
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dfesync.toml");
        std::fs::write(&path, "request_timeout_secs = 15\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.request_timeout_secs, Some(15));
        assert!(matches!(
            FileConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
