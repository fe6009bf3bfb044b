use crate::{
    errors::{InvariantError, RejectReason},
    orderbook::OrderBook,
    orders::{OrderRequest, OrderStatus, OrderType, Side, SubmissionResult},
    trade::Trade,
};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};
use tracing::debug;

/// Runs one incoming order against one book under price-time priority.
///
/// The caller must hold the symbol's lock for the duration; there are no
/// suspension points inside. Trades are emitted at the maker's price,
/// best level first, strict FIFO within each level. Trade ids are drawn
/// from `trade_ids` in emission order.
///
/// `Ok` covers every caller-visible outcome including `rejected`; `Err` is
/// reserved for broken book invariants, in which case the book may be
/// partially mutated and must be quarantined by the caller.
pub fn execute(
    book: &mut OrderBook,
    request: &OrderRequest,
    order_id: u64,
    trade_ids: &AtomicU64,
) -> Result<SubmissionResult, InvariantError> {
    let quantity = request.quantity;
    if let Err(reason) = validate(book, request) {
        debug!(order_id, %reason, "submission rejected");
        return Ok(SubmissionResult::rejected(order_id, quantity, &reason));
    }

    // Market orders trade without a boundary; the rest carry their limit.
    let limit = match request.order_type {
        OrderType::Market => None,
        _ => request.price,
    };

    // All-or-none pre-check: walk best-first, stop as soon as enough
    // accumulates. Failing here leaves the book untouched.
    if request.order_type == OrderType::Fok {
        let available = available_within(book, request.side, limit, quantity);
        if available < quantity {
            let reason = RejectReason::InsufficientLiquidity {
                requested: quantity,
                available,
            };
            debug!(order_id, %reason, "fok killed");
            return Ok(SubmissionResult::rejected(order_id, quantity, &reason));
        }
    }

    let mut trades = Vec::new();
    let mut remaining = quantity;
    sweep(
        book,
        request,
        order_id,
        limit,
        &mut remaining,
        &mut trades,
        trade_ids,
    )?;

    let status = match request.order_type {
        OrderType::Limit => {
            if remaining == 0 {
                OrderStatus::Filled
            } else if let Some(price) = limit {
                book.rest(order_id, request.side, price, remaining);
                OrderStatus::Accepted
            } else {
                // validate() guarantees a price for limit orders
                OrderStatus::Accepted
            }
        }
        OrderType::Market | OrderType::Ioc => {
            if remaining == 0 {
                OrderStatus::Filled
            } else {
                OrderStatus::Canceled
            }
        }
        OrderType::Fok => {
            debug_assert_eq!(remaining, 0, "fok pre-check must guarantee full fill");
            OrderStatus::Filled
        }
    };

    Ok(SubmissionResult {
        order_id,
        status,
        filled_quantity: quantity - remaining,
        remaining_quantity: remaining,
        trades,
        reason: None,
    })
}

fn validate(book: &OrderBook, request: &OrderRequest) -> Result<(), RejectReason> {
    if book.is_quarantined() {
        return Err(RejectReason::Quarantined);
    }
    if request.quantity == 0 {
        return Err(RejectReason::ZeroQuantity);
    }
    if request.order_type.requires_price() && !matches!(request.price, Some(p) if p > 0) {
        return Err(RejectReason::MissingPrice);
    }
    Ok(())
}

/// Whether an aggressor bounded by `limit` may trade against `level_price`.
fn crosses(side: Side, limit: Option<u64>, level_price: u64) -> bool {
    match (side, limit) {
        (_, None) => true,
        (Side::Buy, Some(limit)) => level_price <= limit,
        (Side::Sell, Some(limit)) => level_price >= limit,
    }
}

/// Opposite-side quantity reachable within the boundary, scanning best-first
/// and stopping early once `want` is covered.
fn available_within(book: &OrderBook, side: Side, limit: Option<u64>, want: u64) -> u64 {
    let opposite = book.side(side.opposite());
    let mut available: u64 = 0;
    for price in opposite.prices_best_first() {
        if !crosses(side, limit, price) {
            break;
        }
        available = available.saturating_add(opposite.total_at(price));
        if available >= want {
            break;
        }
    }
    available
}

/// Consumes opposite-side levels best-first while the boundary holds,
/// emitting one trade per maker fill and destroying emptied levels.
fn sweep(
    book: &mut OrderBook,
    request: &OrderRequest,
    taker_order_id: u64,
    limit: Option<u64>,
    remaining: &mut u64,
    trades: &mut Vec<Trade>,
    trade_ids: &AtomicU64,
) -> Result<(), InvariantError> {
    let side = request.side;
    let opposite = book.side_mut(side.opposite());

    while *remaining > 0 {
        let Some(price) = opposite.best_price() else {
            break;
        };
        if !crosses(side, limit, price) {
            break;
        }
        let Some(level) = opposite.level_mut(price) else {
            break;
        };

        while *remaining > 0 {
            let Some(front) = level.peek_front() else {
                break;
            };
            // The front maker is consumed before anyone behind it sees flow.
            let fill = (*remaining).min(front.remaining);
            let maker_order_id = front.id;
            let trade_id = trade_ids.fetch_add(1, Ordering::Relaxed) + 1;
            trades.push(Trade {
                trade_id,
                symbol: request.symbol.clone(),
                price,
                quantity: fill,
                aggressor_side: side,
                maker_order_id,
                taker_order_id,
                timestamp: SystemTime::now(),
            });
            level.consume_front(price, fill)?;
            *remaining -= fill;
        }

        if level.is_empty() {
            opposite.remove_level(price);
        }
    }
    Ok(())
}
