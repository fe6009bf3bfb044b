use crate::{errors::RejectReason, symbol::Symbol, trade::Trade};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,  //bid
    Sell, //ask
}

impl Side {
    /// The side an incoming order consumes liquidity from.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
    /// Immediate-or-cancel: execute what crosses now, drop the rest.
    Ioc,
    /// Fill-or-kill: execute entirely now or not at all.
    Fok,
}

impl OrderType {
    /// Whether this type carries a limit price boundary. Market orders are
    /// the only type without one.
    pub fn requires_price(self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

/// An order as submitted by a caller, before the engine assigns an id.
///
/// `price` is required for limit/ioc/fok and ignored for market orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<u64>,
    pub quantity: u64,
}

/// A limit order resting inside a price level.
///
/// `remaining` is strictly positive while the order rests; the level pops it
/// the instant it hits zero. `seq` is the per-book arrival sequence that
/// time priority is measured against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestingOrder {
    pub id: u64,
    pub side: Side,
    pub price: u64,
    pub remaining: u64,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Fully executed.
    Filled,
    /// Resting in the book (possibly after partial fills).
    Accepted,
    /// Residual quantity was dropped (market exhaustion or ioc remainder).
    Canceled,
    /// Refused with no side effects.
    Rejected,
}

/// What a submission did: the assigned id, terminal status, fill accounting
/// and every trade it produced, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub order_id: u64,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    pub remaining_quantity: u64,
    pub trades: Vec<Trade>,
    /// Present only when `status` is `rejected`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SubmissionResult {
    pub fn rejected(order_id: u64, quantity: u64, reason: &RejectReason) -> Self {
        SubmissionResult {
            order_id,
            status: OrderStatus::Rejected,
            filled_quantity: 0,
            remaining_quantity: quantity,
            trades: Vec::new(),
            reason: Some(reason.to_string()),
        }
    }
}
