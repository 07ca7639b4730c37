use crate::core::precision::Increments;
use rust_decimal::Decimal;

const fn inc(tick: u32, tick_scale: u32, lot: u32, lot_scale: u32) -> Increments {
    Increments::new(
        Decimal::from_parts(tick, 0, 0, false, tick_scale),
        Decimal::from_parts(lot, 0, 0, false, lot_scale),
    )
}

/// Tick and lot sizes of the Zaif spot pairs
const INSTRUMENTS: &[(&str, Increments)] = &[
    ("btc_jpy", inc(5, 0, 1, 4)),
    ("xem_jpy", inc(1, 4, 1, 1)),
    ("mona_jpy", inc(1, 1, 1, 0)),
    ("bch_jpy", inc(5, 0, 1, 4)),
    ("eth_jpy", inc(5, 0, 1, 4)),
    ("zaif_jpy", inc(1, 4, 1, 1)),
    ("pepecash_jpy", inc(1, 4, 1, 4)),
    ("xem_btc", inc(1, 8, 1, 0)),
    ("mona_btc", inc(1, 8, 1, 0)),
    ("bch_btc", inc(1, 4, 1, 4)),
    ("eth_btc", inc(1, 4, 1, 4)),
    ("zaif_btc", inc(1, 8, 1, 0)),
    ("pepecash_btc", inc(1, 8, 1, 0)),
];

/// Increments for a pair; unknown pairs are not quantized
pub fn increments(currency_pair: &str) -> Increments {
    INSTRUMENTS
        .iter()
        .find(|(pair, _)| *pair == currency_pair)
        .map(|(_, increments)| *increments)
        .unwrap_or_default()
}

pub fn min_price_unit(currency_pair: &str) -> Decimal {
    increments(currency_pair).price_tick
}

pub fn min_amount_unit(currency_pair: &str) -> Decimal {
    increments(currency_pair).amount_lot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OrderAction;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_table_values() {
        assert_eq!(min_price_unit("btc_jpy"), d("5"));
        assert_eq!(min_amount_unit("btc_jpy"), d("0.0001"));
        assert_eq!(min_price_unit("mona_jpy"), d("0.1"));
        assert_eq!(min_amount_unit("xem_jpy"), d("0.1"));
        assert_eq!(min_price_unit("xem_btc"), d("0.00000001"));
        assert_eq!(min_amount_unit("pepecash_jpy"), d("0.0001"));
    }

    #[test]
    fn test_unknown_pair_is_unrestricted() {
        assert!(increments("doge_jpy").is_unrestricted());
        assert_eq!(min_price_unit("doge_jpy"), Decimal::ZERO);
    }

    #[test]
    fn test_btc_jpy_order_normalization() {
        let (buy, amount) =
            increments("btc_jpy").normalize(OrderAction::Buy, d("100.03"), d("0.012345"));
        assert_eq!(buy, d("105"));
        assert_eq!(amount, d("0.0123"));
        let (sell, _) = increments("btc_jpy").normalize(OrderAction::Sell, d("100.03"), d("1"));
        assert_eq!(sell, d("100"));
    }
}
