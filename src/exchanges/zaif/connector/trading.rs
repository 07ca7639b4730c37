use crate::core::cursor::OrderCursor;
use crate::core::errors::ExchangeError;
use crate::core::kernel::RetryCallback;
use crate::core::types::{OrderAction, OrderReceipt};
use crate::exchanges::zaif::connector::account::Account;
use crate::exchanges::zaif::rest::{TradeHistoryQuery, ZaifRest};
use crate::exchanges::zaif::{conversions, instruments};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Zaif trading implementation
pub struct Trading {
    rest: Arc<ZaifRest>,
    account: Account,
}

impl Trading {
    pub fn new(rest: &Arc<ZaifRest>, account: &Account) -> Self {
        Self {
            rest: rest.clone(),
            account: account.clone(),
        }
    }

    /// Normalize, submit, and resubmit for as long as `retry_callback` asks to.
    ///
    /// Funds are refreshed after the order is accepted. Once the exchange has
    /// the order, a failed refresh is only logged so the order id is never lost.
    #[instrument(skip(self, retry_callback))]
    pub async fn place_order(
        &self,
        action: OrderAction,
        currency_pair: &str,
        price: Decimal,
        amount: Decimal,
        mut retry_callback: Option<&mut dyn RetryCallback>,
    ) -> Result<OrderReceipt, ExchangeError> {
        let side = conversions::action_to_zaif(action).ok_or_else(|| {
            ExchangeError::InvalidParameters(format!("Can not place an order with action {}", action))
        })?;
        let increments = instruments::increments(currency_pair);
        let (mut price, mut amount) = increments.normalize(action, price, amount);

        loop {
            match self.rest.trade(currency_pair, side, price, amount).await {
                Ok(result) => {
                    info!(
                        currency_pair,
                        order_id = result.order_id,
                        %price,
                        %amount,
                        "order placed"
                    );
                    if let Err(e) = self.account.refresh_funds().await {
                        warn!(
                            currency_pair,
                            order_id = result.order_id,
                            error = %e,
                            "funds refresh failed after order"
                        );
                    }
                    return Ok(OrderReceipt {
                        order_id: result.order_id,
                        price,
                        amount,
                    });
                }
                Err(e) => {
                    let Some(callback) = retry_callback.as_deref_mut() else {
                        return Err(e);
                    };
                    let reason = error_text(&e);
                    if !callback.should_retry(&mut price, &mut amount, &reason) {
                        warn!(currency_pair, %price, %amount, error = %reason, "order given up");
                        return Err(e);
                    }
                    (price, amount) = increments.normalize(action, price, amount);
                    warn!(currency_pair, %price, %amount, error = %reason, "resubmitting order");
                }
            }
        }
    }

    pub async fn buy(
        &self,
        currency_pair: &str,
        price: Decimal,
        amount: Decimal,
        retry_callback: Option<&mut dyn RetryCallback>,
    ) -> Result<OrderReceipt, ExchangeError> {
        self.place_order(OrderAction::Buy, currency_pair, price, amount, retry_callback)
            .await
    }

    pub async fn sell(
        &self,
        currency_pair: &str,
        price: Decimal,
        amount: Decimal,
        retry_callback: Option<&mut dyn RetryCallback>,
    ) -> Result<OrderReceipt, ExchangeError> {
        self.place_order(OrderAction::Sell, currency_pair, price, amount, retry_callback)
            .await
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: i64) -> Result<(), ExchangeError> {
        self.rest.cancel_order(order_id, false).await?;
        info!(order_id, "order cancelled");
        if let Err(e) = self.account.refresh_funds().await {
            warn!(order_id, error = %e, "funds refresh failed after cancel");
        }
        Ok(())
    }

    /// Normal history first, then token history
    pub async fn order_history_cursor(&self, count: u32) -> Result<OrderCursor, ExchangeError> {
        let normal = self
            .rest
            .trade_history(&TradeHistoryQuery::new(count, false))
            .await?;
        let token = self
            .rest
            .trade_history(&TradeHistoryQuery::new(count, true))
            .await?;
        Ok(OrderCursor::chained(vec![
            conversions::convert_zaif_history(normal),
            conversions::convert_zaif_history(token),
        ]))
    }

    /// Normal open orders first, then token open orders
    pub async fn active_order_cursor(&self) -> Result<OrderCursor, ExchangeError> {
        let both = self.rest.active_orders_both().await?;
        Ok(OrderCursor::chained(vec![
            conversions::convert_zaif_active_orders(both.active_orders),
            conversions::convert_zaif_active_orders(both.token_active_orders),
        ]))
    }
}

/// The exchange's own message for rejected calls, the full error otherwise
fn error_text(error: &ExchangeError) -> String {
    match error {
        ExchangeError::ApiError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
