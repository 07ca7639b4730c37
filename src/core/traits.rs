use crate::core::{
    cursor::{BoardCursor, OrderCursor, TradeCursor},
    errors::ExchangeError,
    kernel::RetryCallback,
    types::{Funds, OrderReceipt},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Called with the currency pair after its cached market state changed
pub type StreamingCallback = Arc<dyn Fn(&str) -> Result<(), ExchangeError> + Send + Sync>;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Last traded price seen for the pair
    fn last_price(&self, currency_pair: &str) -> Option<Decimal>;

    /// Bids of the pair
    fn buy_board_cursor(&self, currency_pair: &str) -> BoardCursor;

    /// Asks of the pair
    fn sell_board_cursor(&self, currency_pair: &str) -> BoardCursor;

    fn trades_cursor(&self, currency_pair: &str) -> TradeCursor;

    /// Open one stream per configured pair and feed the market cache
    async fn start_streamings(&self, callback: StreamingCallback) -> Result<(), ExchangeError>;

    async fn stop_streamings(&self) -> Result<(), ExchangeError>;
}

#[async_trait]
pub trait OrderPlacer: Send + Sync {
    /// Place a buy order
    ///
    /// Price and amount are normalized to the pair's tick and lot before
    /// submission. When the order fails, `retry_callback` decides whether it
    /// is submitted again.
    async fn buy(
        &self,
        currency_pair: &str,
        price: Decimal,
        amount: Decimal,
        retry_callback: Option<&mut dyn RetryCallback>,
    ) -> Result<OrderReceipt, ExchangeError>;

    /// Place a sell order
    async fn sell(
        &self,
        currency_pair: &str,
        price: Decimal,
        amount: Decimal,
        retry_callback: Option<&mut dyn RetryCallback>,
    ) -> Result<OrderReceipt, ExchangeError>;

    async fn cancel(&self, order_id: i64) -> Result<(), ExchangeError>;

    /// Own trade history across every order class
    async fn order_history_cursor(&self, count: u32) -> Result<OrderCursor, ExchangeError>;

    /// Own open orders across every order class
    async fn active_order_cursor(&self) -> Result<OrderCursor, ExchangeError>;

    /// Price tick of the pair; zero when the pair is not normalized
    fn min_price_unit(&self, currency_pair: &str) -> Decimal;

    /// Amount lot of the pair; zero when the pair is not normalized
    fn min_amount_unit(&self, currency_pair: &str) -> Decimal;
}

#[async_trait]
pub trait AccountInfo: Send + Sync {
    /// Balances as of the last refresh
    fn funds(&self) -> Funds;

    async fn refresh_funds(&self) -> Result<Funds, ExchangeError>;
}

/// Everything trading logic needs from one exchange
#[async_trait]
pub trait Exchange: MarketDataSource + OrderPlacer + AccountInfo {
    fn name(&self) -> &str;

    fn currency_pairs(&self) -> &[String];

    /// Prepare funds and market state before trading starts
    async fn initialize(&self) -> Result<(), ExchangeError>;

    async fn finalize(&self) -> Result<(), ExchangeError>;
}
