use crate::{orders::Side, symbol::Symbol};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A trade represents a matched transaction between two orders.
///
/// - The price comes from the maker's order (i.e the resting order)
/// - Quantity is the amount filled
/// - The taker is the incoming order that triggered the trade.
///
/// Immutable once emitted; `trade_id` is monotonic per engine lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol: Symbol,
    pub price: u64,
    pub quantity: u64,
    pub aggressor_side: Side,
    pub maker_order_id: u64,
    pub taker_order_id: u64,
    pub timestamp: SystemTime,
}
