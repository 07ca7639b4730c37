use crate::core::config::ConnectorConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::SlidingWindowLimiter;
use crate::exchanges::zaif::{connector::ZaifConnector, rest::ZaifRest};
use std::sync::Arc;

/// Builder for creating Zaif connectors
///
/// Several connectors built with the same limiter share one admission budget,
/// which is how a bot keeps a single account's request rate in bounds.
#[derive(Default)]
pub struct ZaifBuilder {
    config: ConnectorConfig,
    limiter: Option<Arc<SlidingWindowLimiter>>,
}

impl ZaifBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ConnectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_credential(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config = self.config.with_credential(key, secret);
        self
    }

    pub fn with_currency_pairs<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.with_currency_pairs(pairs);
        self
    }

    /// Read boards from a depth proxy at `addr` instead of the exchange stream
    pub fn with_proxy_addr(mut self, addr: impl Into<String>) -> Self {
        self.config = self.config.with_proxy_addr(addr);
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> Result<ZaifConnector, ExchangeError> {
        if let Some(position) = self
            .config
            .credentials
            .iter()
            .position(|c| c.key.is_empty() || c.secret().is_empty())
        {
            return Err(ExchangeError::ConfigurationError(format!(
                "Zaif credential #{} has an empty key or secret",
                position
            )));
        }
        if self.config.currency_pairs.iter().any(|p| p.trim().is_empty()) {
            return Err(ExchangeError::ConfigurationError(
                "Zaif currency pairs must not be blank".to_string(),
            ));
        }

        let mut rest = ZaifRest::new(&self.config);
        if let Some(limiter) = self.limiter {
            rest = rest.with_limiter(limiter);
        }
        Ok(ZaifConnector::with_rest(Arc::new(rest), &self.config))
    }
}

/// Create a Zaif connector from a connector configuration
pub fn build_connector(config: ConnectorConfig) -> Result<ZaifConnector, ExchangeError> {
    ZaifBuilder::new().with_config(config).build()
}
