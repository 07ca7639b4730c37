use crate::core::types::{BoardLevel, OrderRecord, TradeRecord};
use rust_decimal::Decimal;

/// Restartable forward-only iteration over a point-in-time snapshot.
///
/// The snapshot is owned by the cursor, so `len` never changes for a given
/// instance. A cursor is meant for a single caller; build one per consumer.
#[derive(Debug, Clone)]
pub struct SnapshotCursor<T> {
    items: Vec<T>,
    index: usize,
}

pub type BoardCursor = SnapshotCursor<BoardLevel>;
pub type TradeCursor = SnapshotCursor<TradeRecord>;
pub type OrderCursor = SnapshotCursor<OrderRecord>;

impl<T> SnapshotCursor<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, index: 0 }
    }

    /// Present several collections as one sequence, in the order given
    pub fn chained(parts: Vec<Vec<T>>) -> Self {
        Self::new(parts.into_iter().flatten().collect())
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Size of the whole snapshot, independent of the read position
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries not yet returned
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Clone> Iterator for SnapshotCursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.items.get(self.index)?.clone();
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

impl SnapshotCursor<BoardLevel> {
    /// Price column of the board, for quick existence checks
    pub fn price_all(&self) -> Vec<Decimal> {
        self.items.iter().map(|level| level.price).collect()
    }
}

impl<T> Default for SnapshotCursor<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
