use crate::core::errors::ExchangeError;
use crate::core::types::Funds;
use crate::exchanges::zaif::rest::ZaifRest;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, instrument};

/// Zaif account: the funds ledger
#[derive(Clone)]
pub struct Account {
    rest: Arc<ZaifRest>,
    funds: Arc<RwLock<Funds>>,
}

impl Account {
    pub fn new(rest: &Arc<ZaifRest>) -> Self {
        Self {
            rest: rest.clone(),
            funds: Arc::new(RwLock::new(Funds::new())),
        }
    }

    /// Balances as of the last refresh
    pub fn funds(&self) -> Funds {
        self.funds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the ledger with the balances reported by `get_info2`
    #[instrument(skip(self))]
    pub async fn refresh_funds(&self) -> Result<Funds, ExchangeError> {
        let info = self.rest.get_info2().await?;
        debug!(currencies = info.funds.len(), "funds refreshed");
        let mut funds = self.funds.write().unwrap_or_else(PoisonError::into_inner);
        funds.clone_from(&info.funds);
        Ok(funds.clone())
    }
}
