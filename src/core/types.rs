use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Side of an order as reported back to trading logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    Buy,
    Sell,
    Unknown,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One order-book level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoardLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

impl BoardLevel {
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self { price, amount }
    }
}

/// A public trade
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TradeRecord {
    pub tid: i64,
    pub timestamp: i64,
    pub price: Decimal,
    pub amount: Decimal,
    pub trade_type: String,
    pub currency_pair: String,
}

/// One of the account's own orders, active or historical
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRecord {
    pub id: i64,
    pub action: OrderAction,
    pub price: Decimal,
    pub amount: Decimal,
    pub currency_pair: String,
    pub timestamp: i64,
}

/// Outcome of a placed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderReceipt {
    pub order_id: i64,
    /// Price actually submitted after normalization
    pub price: Decimal,
    /// Amount actually submitted after normalization
    pub amount: Decimal,
}

/// Balance per currency
pub type Funds = HashMap<String, Decimal>;

/// Deserializers that tolerate malformed exchange data.
///
/// Exchange payloads are untrusted. A field that cannot be read yields a
/// warning and a zero value instead of failing the whole document.
pub mod lenient {
    use super::BoardLevel;
    use rust_decimal::Decimal;
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::str::FromStr;
    use tracing::warn;

    pub fn decimal_from_value(value: &Value) -> Decimal {
        let parsed = match value {
            Value::Null => return Decimal::ZERO,
            Value::Number(n) => parse_decimal(&n.to_string()),
            Value::String(s) => parse_decimal(s.trim()),
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            warn!(%value, "malformed decimal field, using zero");
            Decimal::ZERO
        })
    }

    pub fn integer_from_value(value: &Value) -> i64 {
        parse_integer(value).unwrap_or_else(|| {
            warn!(%value, "malformed integer field, using zero");
            0
        })
    }

    pub fn timestamp_from_value(value: &Value) -> i64 {
        parse_integer(value).unwrap_or_else(|| {
            warn!(%value, "malformed timestamp field, using zero");
            0
        })
    }

    /// Strings pass through, other scalars are rendered as text
    pub fn text_from_value(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Number(_) | Value::Bool(_) => value.to_string(),
            other => {
                warn!(value = %other, "malformed text field, using empty");
                String::new()
            }
        }
    }

    pub fn levels_from_value(value: &Value) -> Vec<BoardLevel> {
        match value {
            Value::Null => Vec::new(),
            Value::Array(entries) => entries
                .iter()
                .map(|entry| match entry.as_array().map(Vec::as_slice) {
                    Some([price, amount, ..]) => {
                        BoardLevel::new(decimal_from_value(price), decimal_from_value(amount))
                    }
                    _ => {
                        warn!(%entry, "malformed board level, using zero");
                        BoardLevel::default()
                    }
                })
                .collect(),
            other => {
                warn!(value = %other, "board is not an array, treating as empty");
                Vec::new()
            }
        }
    }

    fn parse_integer(value: &Value) -> Option<i64> {
        match value {
            Value::Null => Some(0),
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
                s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64)
            }),
            _ => None,
        }
    }

    fn parse_decimal(raw: &str) -> Option<Decimal> {
        Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .ok()
    }

    pub fn decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(decimal_from_value(&Value::deserialize(deserializer)?))
    }

    pub fn timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(timestamp_from_value(&Value::deserialize(deserializer)?))
    }

    pub fn integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(integer_from_value(&Value::deserialize(deserializer)?))
    }

    pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(text_from_value(&Value::deserialize(deserializer)?))
    }

    /// A nested object that can not be read falls back to its default
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(T::default());
        }
        Ok(T::deserialize(&value).unwrap_or_else(|e| {
            warn!(%value, error = %e, "malformed object, using default");
            T::default()
        }))
    }

    /// Array of records; entries that can not be read are skipped
    pub fn records<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let entries = match Value::deserialize(deserializer)? {
            Value::Null => return Ok(Vec::new()),
            Value::Array(entries) => entries,
            other => {
                warn!(value = %other, "records are not an array, treating as empty");
                return Ok(Vec::new());
            }
        };
        Ok(entries
            .iter()
            .filter_map(|entry| match T::deserialize(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(%entry, error = %e, "malformed record, skipping");
                    None
                }
            })
            .collect())
    }

    pub fn levels<'de, D>(deserializer: D) -> Result<Vec<BoardLevel>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(levels_from_value(&Value::deserialize(deserializer)?))
    }
}
