use crate::core::config::ConnectorConfig;
use crate::core::cursor::{BoardCursor, OrderCursor, TradeCursor};
use crate::core::errors::ExchangeError;
use crate::core::kernel::RetryCallback;
use crate::core::traits::{AccountInfo, Exchange, MarketDataSource, OrderPlacer, StreamingCallback};
use crate::core::types::{Funds, OrderReceipt};
use crate::exchanges::zaif::{instruments, rest::ZaifRest};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub mod account;
pub mod market_data;
pub mod trading;

pub use account::Account;
pub use market_data::{MarketData, StreamSettings};
pub use trading::Trading;

pub const EXCHANGE_NAME: &str = "zaif";

/// Zaif connector that composes all sub-trait implementations
pub struct ZaifConnector {
    currency_pairs: Vec<String>,
    rest: Arc<ZaifRest>,
    pub market: MarketData,
    pub trading: Trading,
    pub account: Account,
}

impl ZaifConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self::with_rest(Arc::new(ZaifRest::new(config)), config)
    }

    pub fn with_rest(rest: Arc<ZaifRest>, config: &ConnectorConfig) -> Self {
        let account = Account::new(&rest);
        Self {
            currency_pairs: config
                .currency_pairs
                .iter()
                .map(|pair| pair.to_lowercase())
                .collect(),
            market: MarketData::new(&rest, StreamSettings::from_config(config)),
            trading: Trading::new(&rest, &account),
            account,
            rest,
        }
    }

    pub fn rest(&self) -> &Arc<ZaifRest> {
        &self.rest
    }
}

#[async_trait]
impl AccountInfo for ZaifConnector {
    fn funds(&self) -> Funds {
        self.account.funds()
    }

    async fn refresh_funds(&self) -> Result<Funds, ExchangeError> {
        self.account.refresh_funds().await
    }
}

#[async_trait]
impl MarketDataSource for ZaifConnector {
    fn last_price(&self, currency_pair: &str) -> Option<Decimal> {
        self.market.last_price(currency_pair)
    }

    fn buy_board_cursor(&self, currency_pair: &str) -> BoardCursor {
        self.market.buy_board_cursor(currency_pair)
    }

    fn sell_board_cursor(&self, currency_pair: &str) -> BoardCursor {
        self.market.sell_board_cursor(currency_pair)
    }

    fn trades_cursor(&self, currency_pair: &str) -> TradeCursor {
        self.market.trades_cursor(currency_pair)
    }

    async fn start_streamings(&self, callback: StreamingCallback) -> Result<(), ExchangeError> {
        self.market
            .start_streamings(&self.currency_pairs, callback)
            .await
    }

    async fn stop_streamings(&self) -> Result<(), ExchangeError> {
        self.market.stop_streamings().await
    }
}

#[async_trait]
impl OrderPlacer for ZaifConnector {
    async fn buy(
        &self,
        currency_pair: &str,
        price: Decimal,
        amount: Decimal,
        retry_callback: Option<&mut dyn RetryCallback>,
    ) -> Result<OrderReceipt, ExchangeError> {
        self.trading
            .buy(currency_pair, price, amount, retry_callback)
            .await
    }

    async fn sell(
        &self,
        currency_pair: &str,
        price: Decimal,
        amount: Decimal,
        retry_callback: Option<&mut dyn RetryCallback>,
    ) -> Result<OrderReceipt, ExchangeError> {
        self.trading
            .sell(currency_pair, price, amount, retry_callback)
            .await
    }

    async fn cancel(&self, order_id: i64) -> Result<(), ExchangeError> {
        self.trading.cancel(order_id).await
    }

    async fn order_history_cursor(&self, count: u32) -> Result<OrderCursor, ExchangeError> {
        self.trading.order_history_cursor(count).await
    }

    async fn active_order_cursor(&self) -> Result<OrderCursor, ExchangeError> {
        self.trading.active_order_cursor().await
    }

    fn min_price_unit(&self, currency_pair: &str) -> Decimal {
        instruments::min_price_unit(currency_pair)
    }

    fn min_amount_unit(&self, currency_pair: &str) -> Decimal {
        instruments::min_amount_unit(currency_pair)
    }
}

#[async_trait]
impl Exchange for ZaifConnector {
    fn name(&self) -> &str {
        EXCHANGE_NAME
    }

    fn currency_pairs(&self) -> &[String] {
        &self.currency_pairs
    }

    /// Load funds and seed every pair's board from the depth endpoint
    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<(), ExchangeError> {
        if self.rest.has_signer() {
            self.account.refresh_funds().await?;
        } else {
            warn!("no API credentials, funds are not loaded");
        }
        for pair in &self.currency_pairs {
            self.market.refresh_depth(pair).await?;
        }
        info!(pairs = self.currency_pairs.len(), "zaif initialized");
        Ok(())
    }

    async fn finalize(&self) -> Result<(), ExchangeError> {
        self.market.stop_streamings().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_are_lowercased() {
        let connector = ZaifConnector::new(
            &ConnectorConfig::read_only().with_currency_pairs(["BTC_JPY", "xem_jpy"]),
        );
        assert_eq!(connector.currency_pairs(), ["btc_jpy", "xem_jpy"]);
        assert_eq!(connector.name(), "zaif");
        assert_eq!(connector.min_price_unit("btc_jpy"), Decimal::new(5, 0));
        assert!(connector.funds().is_empty());
        assert!(connector.buy_board_cursor("btc_jpy").is_empty());
    }
}
