use crate::core::config::{ConnectorConfig, ExchangesConfig};
use crate::core::errors::ExchangeError;
use crate::core::traits::Exchange;
use crate::exchanges::zaif;
use tracing::info;

/// Picks an exchange's section out of the combined configuration
pub type ConfigExtractor = fn(&ExchangesConfig) -> Option<&ConnectorConfig>;

/// Builds a connector from its section
pub type ExchangeConstructor = fn(ConnectorConfig) -> Result<Box<dyn Exchange>, ExchangeError>;

struct Registration {
    name: &'static str,
    extract: ConfigExtractor,
    construct: ExchangeConstructor,
}

/// Explicit list of the exchanges this build can drive
#[derive(Default)]
pub struct ExchangeRegistry {
    registrations: Vec<Registration>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in exchange
    pub fn with_defaults() -> Self {
        Self::new().register(zaif::connector::EXCHANGE_NAME, |c| c.zaif.as_ref(), |config| {
            Ok(Box::new(zaif::build_connector(config)?))
        })
    }

    /// Add an exchange; a later registration under the same name replaces the earlier one
    pub fn register(
        mut self,
        name: &'static str,
        extract: ConfigExtractor,
        construct: ExchangeConstructor,
    ) -> Self {
        self.registrations.retain(|r| r.name != name);
        self.registrations.push(Registration {
            name,
            extract,
            construct,
        });
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.registrations.iter().map(|r| r.name).collect()
    }

    /// Build every exchange whose section is present, in registration order
    pub fn create_all(
        &self,
        config: &ExchangesConfig,
    ) -> Result<Vec<Box<dyn Exchange>>, ExchangeError> {
        let mut exchanges = Vec::new();
        for registration in &self.registrations {
            let Some(section) = (registration.extract)(config) else {
                continue;
            };
            let exchange = (registration.construct)(section.clone())?;
            info!(exchange = registration.name, "exchange created");
            exchanges.push(exchange);
        }
        Ok(exchanges)
    }
}
