use crate::core::cache::PairSnapshot;
use crate::core::types::{OrderAction, OrderRecord, TradeRecord};
use crate::exchanges::zaif::types::{
    ZaifActiveOrders, ZaifHistory, ZaifStreamFrame, ZaifTrade,
};
use tracing::warn;

/// `bid` is a buy, `ask` is a sell
pub fn action_from_zaif(action: &str) -> OrderAction {
    match action {
        "bid" => OrderAction::Buy,
        "ask" => OrderAction::Sell,
        _ => OrderAction::Unknown,
    }
}

pub fn action_to_zaif(action: OrderAction) -> Option<&'static str> {
    match action {
        OrderAction::Buy => Some("bid"),
        OrderAction::Sell => Some("ask"),
        OrderAction::Unknown => None,
    }
}

/// Order ids arrive as map keys; an unreadable key becomes 0
pub fn order_id_from_key(key: &str) -> i64 {
    key.parse().unwrap_or_else(|e| {
        warn!(key, error = %e, "can not parse order id");
        0
    })
}

pub fn convert_zaif_trade(trade: &ZaifTrade) -> TradeRecord {
    TradeRecord {
        tid: trade.tid,
        timestamp: trade.date,
        price: trade.price,
        amount: trade.amount,
        trade_type: trade.trade_type.clone(),
        currency_pair: trade.currency_pair.clone(),
    }
}

/// Own trade history in ascending order id
pub fn convert_zaif_history(history: ZaifHistory) -> Vec<OrderRecord> {
    let mut orders: Vec<OrderRecord> = history
        .into_iter()
        .map(|(key, record)| OrderRecord {
            id: order_id_from_key(&key),
            action: action_from_zaif(&record.action),
            price: record.price,
            amount: record.amount,
            currency_pair: record.currency_pair,
            timestamp: record.timestamp,
        })
        .collect();
    orders.sort_by_key(|order| order.id);
    orders
}

/// Own open orders in ascending order id
pub fn convert_zaif_active_orders(active: ZaifActiveOrders) -> Vec<OrderRecord> {
    let mut orders: Vec<OrderRecord> = active
        .into_iter()
        .map(|(key, record)| OrderRecord {
            id: order_id_from_key(&key),
            action: action_from_zaif(&record.action),
            price: record.price,
            amount: record.amount,
            currency_pair: record.currency_pair,
            timestamp: record.timestamp,
        })
        .collect();
    orders.sort_by_key(|order| order.id);
    orders
}

/// Cache entry built from one pushed stream frame
pub fn convert_zaif_stream_frame(frame: ZaifStreamFrame) -> PairSnapshot {
    PairSnapshot {
        trades: frame.trades.iter().map(convert_zaif_trade).collect(),
        bids: frame.bids,
        asks: frame.asks,
        last_price: frame.last_price.price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::zaif::types::ZaifActiveOrder;
    use rust_decimal::Decimal;

    #[test]
    fn test_action_mapping() {
        assert_eq!(action_from_zaif("bid"), OrderAction::Buy);
        assert_eq!(action_from_zaif("ask"), OrderAction::Sell);
        assert_eq!(action_from_zaif("withdraw"), OrderAction::Unknown);
        assert_eq!(action_to_zaif(OrderAction::Buy), Some("bid"));
        assert_eq!(action_to_zaif(OrderAction::Unknown), None);
    }

    #[test]
    fn test_bad_order_key_becomes_zero() {
        let mut active = ZaifActiveOrders::new();
        active.insert(
            "x12".to_string(),
            ZaifActiveOrder {
                action: "ask".to_string(),
                price: Decimal::ONE,
                ..ZaifActiveOrder::default()
            },
        );
        active.insert("42".to_string(), ZaifActiveOrder::default());
        let orders = convert_zaif_active_orders(active);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, 0);
        assert_eq!(orders[0].action, OrderAction::Sell);
        assert_eq!(orders[1].id, 42);
        assert_eq!(orders[1].action, OrderAction::Unknown);
    }
}
