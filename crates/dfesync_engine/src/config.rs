//! Configuration for the sync engine.

use dfesync_protocol::{AckType, Environment, ServiceKind};
use rand::Rng;
use std::time::Duration;

/// Base URLs of the distribution services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// NF-e `NFeDistribuicaoDFe` SOAP endpoint.
    pub nfe: String,
    /// National NFS-e API base URL, without a trailing slash.
    pub nfse: String,
}

impl Endpoints {
    /// The official endpoints of `environment`.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self {
                nfe: "https://www1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx"
                    .into(),
                nfse: "https://adn.nfse.gov.br".into(),
            },
            Environment::Homologation => Self {
                nfe: "https://hom1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx"
                    .into(),
                nfse: "https://adn.producaorestrita.nfse.gov.br".into(),
            },
        }
    }

    /// Points both services at `base`. Used against local mock servers.
    #[must_use]
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            nfe: format!("{base}/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx"),
            nfse: base.to_string(),
        }
    }

    /// Returns the URL used for `kind`.
    #[must_use]
    pub fn url_for(&self, kind: ServiceKind) -> &str {
        match kind {
            ServiceKind::Nfe => &self.nfe,
            ServiceKind::NfseNational => &self.nfse,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

/// Configuration for the poller and the orchestrator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Production or homologation.
    pub environment: Environment,
    /// Service URLs.
    pub endpoints: Endpoints,
    /// How long an EMPTY response blocks polling at the same cursor.
    pub cooldown_window: Duration,
    /// Sleep between terminal outcomes and the next cycle.
    pub cycle_interval: Duration,
    /// Backoff after THROTTLED or transport failures.
    pub backoff: RetryConfig,
    /// Delay before the single immediate retry of a transport failure.
    pub transport_retry_delay: Duration,
    /// Bound on one request/response exchange.
    pub request_timeout: Duration,
    /// Maximum batches requested back to back in one cycle.
    pub drain_limit: u32,
    /// Acknowledgment submitted for each new invoice summary, if any.
    pub auto_acknowledge: Option<AckType>,
}

impl EngineConfig {
    /// Creates a configuration for `environment` with default timings.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            endpoints: Endpoints::for_environment(environment),
            cooldown_window: Duration::from_secs(60 * 60),
            cycle_interval: Duration::from_secs(60 * 60),
            backoff: RetryConfig::default(),
            transport_retry_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(60),
            drain_limit: 50,
            auto_acknowledge: None,
        }
    }

    /// Sets the service URLs.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Sets the cooldown window.
    #[must_use]
    pub fn with_cooldown_window(mut self, window: Duration) -> Self {
        self.cooldown_window = window;
        self
    }

    /// Sets the inter-cycle interval.
    #[must_use]
    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// Sets the throttle/transport backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the delay before the immediate transport retry.
    #[must_use]
    pub fn with_transport_retry_delay(mut self, delay: Duration) -> Self {
        self.transport_retry_delay = delay;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the drain limit. Zero is treated as one.
    #[must_use]
    pub fn with_drain_limit(mut self, limit: u32) -> Self {
        self.drain_limit = limit.max(1);
        self
    }

    /// Enables automatic acknowledgment of new invoice summaries.
    #[must_use]
    pub fn with_auto_acknowledge(mut self, ack: Option<AckType>) -> Self {
        self.auto_acknowledge = ack;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(Environment::default())
    }
}

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the delay, before jitter.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a backoff starting at `initial_delay` and capped at `max_delay`.
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// A fixed delay without growth or jitter.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(15 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.cooldown_window, Duration::from_secs(3600));
        assert_eq!(config.cycle_interval, Duration::from_secs(3600));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.drain_limit, 50);
        assert!(config.auto_acknowledge.is_none());
        assert!(config.endpoints.nfe.starts_with("https://www1.nfe"));
    }

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new(Environment::Homologation)
            .with_cooldown_window(Duration::from_secs(10))
            .with_drain_limit(0)
            .with_auto_acknowledge(Some(AckType::Awareness));

        assert_eq!(config.cooldown_window, Duration::from_secs(10));
        assert_eq!(config.drain_limit, 1);
        assert_eq!(config.auto_acknowledge, Some(AckType::Awareness));
        assert!(config.endpoints.nfse.contains("producaorestrita"));
    }

    #[test]
    fn local_endpoints_share_base() {
        let endpoints = Endpoints::local("http://127.0.0.1:9000/");
        assert_eq!(
            endpoints.url_for(ServiceKind::Nfe),
            "http://127.0.0.1:9000/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx"
        );
        assert_eq!(
            endpoints.url_for(ServiceKind::NfseNational),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(Duration::from_millis(100), Duration::from_secs(30));

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(Duration::from_secs(1), Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(5);
        assert!(delay <= Duration::from_millis(6250));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let config = RetryConfig::fixed(Duration::from_secs(7));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(7));
        assert_eq!(config.delay_for_attempt(9), Duration::from_secs(7));
    }
}
