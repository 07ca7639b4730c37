use crate::core::cursor::{BoardCursor, TradeCursor};
use crate::core::types::{BoardLevel, TradeRecord};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Latest known market state of one currency pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairSnapshot {
    pub bids: Vec<BoardLevel>,
    pub asks: Vec<BoardLevel>,
    pub last_price: Decimal,
    pub trades: Vec<TradeRecord>,
}

/// Per-pair market state shared between stream callbacks and cursor readers.
///
/// Written by streaming or depth polling, read by cursor construction. Every
/// access copies in or out under one mutex.
#[derive(Debug, Default)]
pub struct MarketCache {
    pairs: Mutex<HashMap<String, PairSnapshot>>,
}

impl MarketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything known about a pair
    pub fn update(&self, currency_pair: &str, snapshot: PairSnapshot) {
        self.pairs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(currency_pair.to_string(), snapshot);
    }

    /// Replace only the board, keeping last price and trades
    pub fn update_depth(&self, currency_pair: &str, bids: Vec<BoardLevel>, asks: Vec<BoardLevel>) {
        let mut pairs = self.pairs.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = pairs.entry(currency_pair.to_string()).or_default();
        entry.bids = bids;
        entry.asks = asks;
    }

    pub fn snapshot(&self, currency_pair: &str) -> Option<PairSnapshot> {
        self.pairs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(currency_pair)
            .cloned()
    }

    /// `None` until a trade price has been seen for the pair
    pub fn last_price(&self, currency_pair: &str) -> Option<Decimal> {
        self.read(currency_pair, |s| s.last_price)
            .filter(|price| !price.is_zero())
    }

    /// Cursor over the bids (the board buyers post to)
    pub fn buy_board_cursor(&self, currency_pair: &str) -> BoardCursor {
        BoardCursor::new(self.read(currency_pair, |s| s.bids.clone()).unwrap_or_default())
    }

    /// Cursor over the asks (the board sellers post to)
    pub fn sell_board_cursor(&self, currency_pair: &str) -> BoardCursor {
        BoardCursor::new(self.read(currency_pair, |s| s.asks.clone()).unwrap_or_default())
    }

    pub fn trades_cursor(&self, currency_pair: &str) -> TradeCursor {
        TradeCursor::new(self.read(currency_pair, |s| s.trades.clone()).unwrap_or_default())
    }

    pub fn pairs(&self) -> Vec<String> {
        self.pairs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn read<R>(&self, currency_pair: &str, f: impl FnOnce(&PairSnapshot) -> R) -> Option<R> {
        self.pairs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(currency_pair)
            .map(f)
    }
}
