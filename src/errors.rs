use thiserror::Error;

/// Why a submission came back with status `rejected`.
///
/// None of these mutate the book: a rejected submission leaves every level
/// exactly as it found it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("quantity must be > 0")]
    ZeroQuantity,

    #[error("limit, ioc and fok orders require a price > 0")]
    MissingPrice,

    #[error("insufficient liquidity: wanted {requested}, available {available}")]
    InsufficientLiquidity { requested: u64, available: u64 },

    #[error("book is quarantined after an internal fault")]
    Quarantined,

    #[error("matching task failed")]
    Internal,
}

/// A broken book invariant detected mid-match.
///
/// Must never occur; when it does, the matching step aborts, the book is
/// quarantined and the fault goes to the operator log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    #[error("level {price}: consuming {quantity} exceeds front order remaining {front_remaining}")]
    OverConsume {
        price: u64,
        quantity: u64,
        front_remaining: u64,
    },

    #[error("level {price}: total quantity underflow")]
    TotalUnderflow { price: u64 },
}
