use crate::core::types::OrderAction;
use rust_decimal::Decimal;

/// Smallest price and amount increments an instrument accepts.
///
/// A zero increment disables quantization for that field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Increments {
    pub price_tick: Decimal,
    pub amount_lot: Decimal,
}

impl Increments {
    pub const fn new(price_tick: Decimal, amount_lot: Decimal) -> Self {
        Self {
            price_tick,
            amount_lot,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.price_tick.is_zero() && self.amount_lot.is_zero()
    }

    /// Quantize an order before submission.
    ///
    /// The price is floored to the tick. When flooring changed it, a buy is
    /// raised by one tick and a sell keeps the floored value. The amount is
    /// floored to the lot.
    pub fn normalize(
        &self,
        action: OrderAction,
        price: Decimal,
        amount: Decimal,
    ) -> (Decimal, Decimal) {
        (
            self.normalize_price(action, price),
            floor_to(amount, self.amount_lot).normalize(),
        )
    }

    pub fn normalize_price(&self, action: OrderAction, price: Decimal) -> Decimal {
        let floored = floor_to(price, self.price_tick);
        let adjusted = if floored != price && action == OrderAction::Buy {
            floored + self.price_tick
        } else {
            floored
        };
        adjusted.normalize()
    }
}

fn floor_to(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).trunc() * step
}
