use crate::core::types::{lenient, BoardLevel};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Body of a successful private API response
#[derive(Debug, Deserialize)]
pub struct ZaifResult<T> {
    #[serde(rename = "return")]
    pub result: T,
}

/// Balance map keyed by currency, tolerant of malformed amounts
pub fn decimal_map<'de, D>(deserializer: D) -> Result<HashMap<String, Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<HashMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .iter()
        .map(|(currency, value)| (currency.clone(), lenient::decimal_from_value(value)))
        .collect())
}

// Public API

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ZaifCurrency {
    pub name: String,
    #[serde(default)]
    pub is_token: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ZaifCurrencyPair {
    pub currency_pair: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_token: bool,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub event_number: i64,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub aux_unit_min: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub aux_unit_step: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub item_unit_min: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub item_unit_step: Decimal,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct ZaifLastPrice {
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub last_price: Decimal,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct ZaifTicker {
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub last: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub high: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub low: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub vwap: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub volume: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub bid: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub ask: Decimal,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ZaifTrade {
    #[serde(default, deserialize_with = "lenient::integer")]
    pub tid: i64,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub date: i64,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient::text")]
    pub trade_type: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub currency_pair: String,
}

/// Order book as served by `/api/1/depth/{pair}` and relayed by the depth proxy
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ZaifDepth {
    #[serde(default, deserialize_with = "lenient::levels", serialize_with = "levels_as_pairs")]
    pub asks: Vec<BoardLevel>,
    #[serde(default, deserialize_with = "lenient::levels", serialize_with = "levels_as_pairs")]
    pub bids: Vec<BoardLevel>,
}

fn levels_as_pairs<S>(levels: &[BoardLevel], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(levels.len()))?;
    for level in levels {
        seq.serialize_element(&(level.price, level.amount))?;
    }
    seq.end()
}

// Streaming

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZaifStreamLastPrice {
    #[serde(default, deserialize_with = "lenient::text")]
    pub action: String,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub price: Decimal,
}

/// One pushed frame of `wss://ws.zaif.jp/stream`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZaifStreamFrame {
    #[serde(default, deserialize_with = "lenient::levels")]
    pub asks: Vec<BoardLevel>,
    #[serde(default, deserialize_with = "lenient::levels")]
    pub bids: Vec<BoardLevel>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub currency_pair: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub last_price: ZaifStreamLastPrice,
    #[serde(default, deserialize_with = "lenient::text")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::records")]
    pub trades: Vec<ZaifTrade>,
}

// Private API

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZaifInfo2 {
    #[serde(default, deserialize_with = "decimal_map")]
    pub funds: HashMap<String, Decimal>,
    #[serde(default, deserialize_with = "decimal_map")]
    pub deposit: HashMap<String, Decimal>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub open_orders: i64,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub server_time: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZaifTradeResult {
    #[serde(default, deserialize_with = "lenient::integer")]
    pub order_id: i64,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub received: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub remains: Decimal,
    #[serde(default, deserialize_with = "decimal_map")]
    pub funds: HashMap<String, Decimal>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZaifCancelResult {
    #[serde(default, deserialize_with = "lenient::integer")]
    pub order_id: i64,
    #[serde(default, deserialize_with = "decimal_map")]
    pub funds: HashMap<String, Decimal>,
}

/// Entry of `trade_history`, keyed by order id in the response
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZaifHistoryRecord {
    #[serde(default)]
    pub currency_pair: String,
    #[serde(default)]
    pub action: String,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub fee: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub bonus: Decimal,
    #[serde(default)]
    pub your_action: String,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub timestamp: i64,
}

/// Entry of `active_orders`, keyed by order id in the response
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZaifActiveOrder {
    #[serde(default)]
    pub currency_pair: String,
    #[serde(default)]
    pub action: String,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub timestamp: i64,
}

pub type ZaifHistory = HashMap<String, ZaifHistoryRecord>;
pub type ZaifActiveOrders = HashMap<String, ZaifActiveOrder>;

/// `active_orders` with `is_token_both=1`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZaifActiveOrdersBoth {
    #[serde(default)]
    pub active_orders: ZaifActiveOrders,
    #[serde(default)]
    pub token_active_orders: ZaifActiveOrders,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_stream_frame_decodes() {
        let frame: ZaifStreamFrame = serde_json::from_str(
            r#"{
                "asks": [[101.0, 0.5], [102.0, 1.25]],
                "bids": [[100.0, 2.0]],
                "trades": [{"currency_pair": "btc_jpy", "trade_type": "ask", "price": 100.0,
                            "tid": 7, "amount": 0.01, "date": 1513066254}],
                "timestamp": "2017-12-12 17:10:54.000000",
                "last_price": {"action": "ask", "price": 100.0},
                "currency_pair": "btc_jpy"
            }"#,
        )
        .unwrap();
        assert_eq!(frame.asks.len(), 2);
        assert_eq!(frame.bids[0], BoardLevel::new(d("100.0"), d("2.0")));
        assert_eq!(frame.last_price.price, d("100.0"));
        assert_eq!(frame.trades[0].tid, 7);
        assert_eq!(frame.trades[0].date, 1_513_066_254);
    }

    #[test]
    fn test_malformed_trade_fields_keep_the_frame() {
        let frame: ZaifStreamFrame = serde_json::from_str(
            r#"{
                "asks": [[101.0, 0.5]],
                "bids": [[100.0, 2.0]],
                "trades": [{"currency_pair": "btc_jpy", "trade_type": "bid", "price": 100.5,
                            "tid": "x7", "amount": 0.02, "date": 1513066255},
                           "junk",
                           {"currency_pair": "btc_jpy", "trade_type": "ask", "price": 100.0,
                            "tid": 8, "amount": 0.01, "date": 1513066254}],
                "timestamp": 1513066255,
                "last_price": "broken",
                "currency_pair": "btc_jpy"
            }"#,
        )
        .unwrap();
        assert_eq!(frame.trades.len(), 2);
        assert_eq!(frame.trades[0].tid, 0);
        assert_eq!(frame.trades[0].price, d("100.5"));
        assert_eq!(frame.trades[1].tid, 8);
        assert_eq!(frame.timestamp, "1513066255");
        assert_eq!(frame.last_price.price, Decimal::ZERO);
        assert_eq!(frame.asks.len(), 1);
    }

    #[test]
    fn test_trade_result_tolerates_bad_order_id() {
        let result: ZaifResult<ZaifTradeResult> = serde_json::from_str(
            r#"{"success":1,"return":{"order_id":"184","received":0,"remains":0.1,"funds":{}}}"#,
        )
        .unwrap();
        assert_eq!(result.result.order_id, 184);
        let cancel: ZaifResult<ZaifCancelResult> =
            serde_json::from_str(r#"{"success":1,"return":{"order_id":[1],"funds":{}}}"#).unwrap();
        assert_eq!(cancel.result.order_id, 0);
    }

    #[test]
    fn test_info2_funds_tolerate_bad_values() {
        let info: ZaifResult<ZaifInfo2> = serde_json::from_str(
            r#"{"success":1,"return":{"funds":{"jpy":15320,"btc":"1.392","mona":"oops"},
                "deposit":{"jpy":15320},"open_orders":3,"server_time":1401168000}}"#,
        )
        .unwrap();
        let funds = info.result.funds;
        assert_eq!(funds["jpy"], d("15320"));
        assert_eq!(funds["btc"], d("1.392"));
        assert_eq!(funds["mona"], Decimal::ZERO);
        assert_eq!(info.result.open_orders, 3);
    }

    #[test]
    fn test_active_orders_both() {
        let both: ZaifResult<ZaifActiveOrdersBoth> = serde_json::from_str(
            r#"{"success":1,"return":{
                "active_orders":{"184":{"currency_pair":"btc_jpy","action":"bid","amount":0.1,"price":100000,"timestamp":"1402021125"}},
                "token_active_orders":{}}}"#,
        )
        .unwrap();
        assert_eq!(both.result.active_orders.len(), 1);
        assert_eq!(both.result.active_orders["184"].timestamp, 1_402_021_125);
        assert!(both.result.token_active_orders.is_empty());
    }

    #[test]
    fn test_depth_round_trips_as_pairs() {
        let depth = ZaifDepth {
            asks: vec![BoardLevel::new(d("101"), d("0.5"))],
            bids: Vec::new(),
        };
        let text = serde_json::to_string(&depth).unwrap();
        assert_eq!(text, r#"{"asks":[["101","0.5"]],"bids":[]}"#);
        let back: ZaifDepth = serde_json::from_str(&text).unwrap();
        assert_eq!(back, depth);
    }
}
