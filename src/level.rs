use crate::{errors::InvariantError, orders::RestingOrder};
use std::collections::VecDeque;

/// A single price level: a strict-FIFO queue of resting orders plus a cached
/// total of their remaining quantities.
///
/// No operation reorders the queue; time priority within a price is exactly
/// arrival order. The owning side destroys the level once the queue empties.
#[derive(Debug, Default)]
pub struct PriceLevel {
    orders: VecDeque<RestingOrder>,
    total: u64,
}

impl PriceLevel {
    pub fn new() -> Self {
        PriceLevel {
            orders: VecDeque::new(),
            total: 0,
        }
    }

    /// Pushes an order to the tail of the queue.
    pub fn append(&mut self, order: RestingOrder) {
        self.total += order.remaining;
        self.orders.push_back(order);
    }

    /// The order next in line to be matched, if any.
    pub fn peek_front(&self) -> Option<&RestingOrder> {
        self.orders.front()
    }

    /// Fills `quantity` against the front order, popping it once exhausted.
    ///
    /// `quantity` must not exceed the front order's remaining; a violation
    /// is a broken invariant, not a partial consume.
    pub fn consume_front(&mut self, price: u64, quantity: u64) -> Result<(), InvariantError> {
        let Some(front) = self.orders.front_mut() else {
            return Err(InvariantError::OverConsume {
                price,
                quantity,
                front_remaining: 0,
            });
        };
        front.remaining = front.remaining.checked_sub(quantity).ok_or(
            InvariantError::OverConsume {
                price,
                quantity,
                front_remaining: front.remaining,
            },
        )?;
        if front.remaining == 0 {
            self.orders.pop_front();
        }
        self.total = self
            .total
            .checked_sub(quantity)
            .ok_or(InvariantError::TotalUnderflow { price })?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Sum of remaining quantity across the queue (cached).
    pub fn total(&self) -> u64 {
        self.total
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &RestingOrder> {
        self.orders.iter()
    }
}
