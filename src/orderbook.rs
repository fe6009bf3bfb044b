use crate::{
    level::PriceLevel,
    orders::{RestingOrder, Side},
    symbol::Symbol,
};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    time::SystemTime,
};

/// Internal enum to unify the two best-price heaps.
///
/// - Bids want the **highest** price first: a plain max-heap.
/// - Asks want the **lowest** price first: a min-heap via [`Reverse`].
#[derive(Debug)]
enum PriceHeap {
    Bids(BinaryHeap<u64>),
    Asks(BinaryHeap<Reverse<u64>>),
}

impl PriceHeap {
    fn push(&mut self, price: u64) {
        match self {
            PriceHeap::Bids(heap) => heap.push(price),
            PriceHeap::Asks(heap) => heap.push(Reverse(price)),
        }
    }

    fn peek(&self) -> Option<u64> {
        match self {
            PriceHeap::Bids(heap) => heap.peek().copied(),
            PriceHeap::Asks(heap) => heap.peek().map(|Reverse(p)| *p),
        }
    }

    fn pop(&mut self) -> Option<u64> {
        match self {
            PriceHeap::Bids(heap) => heap.pop(),
            PriceHeap::Asks(heap) => heap.pop().map(|Reverse(p)| p),
        }
    }
}

/// One side of the book: `price -> PriceLevel` plus a best-price heap with
/// **lazy deletion**.
///
/// The level map is the source of truth. When a level dies its map entry is
/// removed but the heap is not repaired; stale tops are popped on the next
/// best-price query. A price is pushed only when its level is created, so
/// the heap never grows past the number of levels created and pruning stays
/// cheap.
#[derive(Debug)]
pub struct BookSide {
    side: Side,
    levels: HashMap<u64, PriceLevel>,
    heap: PriceHeap,
}

impl BookSide {
    fn new(side: Side) -> Self {
        BookSide {
            side,
            levels: HashMap::new(),
            heap: match side {
                Side::Buy => PriceHeap::Bids(BinaryHeap::new()),
                Side::Sell => PriceHeap::Asks(BinaryHeap::new()),
            },
        }
    }

    /// Best live price, pruning stale heap tops on the way.
    pub fn best_price(&mut self) -> Option<u64> {
        while let Some(price) = self.heap.peek() {
            if self.levels.contains_key(&price) {
                return Some(price);
            }
            self.heap.pop();
        }
        None
    }

    /// Inserts a resting order, creating the level (and heap entry) if the
    /// price is new.
    pub fn add_resting(&mut self, order: RestingOrder) {
        let price = order.price;
        match self.levels.get_mut(&price) {
            Some(level) => level.append(order),
            None => {
                let mut level = PriceLevel::new();
                level.append(order);
                self.levels.insert(price, level);
                self.heap.push(price);
            }
        }
    }

    pub(crate) fn level_mut(&mut self, price: u64) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    /// Drops a dead level from the map; the heap entry goes stale and is
    /// pruned lazily.
    pub(crate) fn remove_level(&mut self, price: u64) {
        self.levels.remove(&price);
    }

    /// Live prices, best first. The map only ever holds live levels, so this
    /// needs no pruning.
    pub fn prices_best_first(&self) -> Vec<u64> {
        let mut prices: Vec<u64> = self.levels.keys().copied().collect();
        match self.side {
            Side::Buy => prices.sort_unstable_by(|a, b| b.cmp(a)),
            Side::Sell => prices.sort_unstable(),
        }
        prices
    }

    /// Up to `n` levels as `(price, total_quantity)`, best first: descending
    /// for bids, ascending for asks.
    pub fn depth(&self, n: usize) -> Vec<(u64, u64)> {
        self.prices_best_first()
            .into_iter()
            .take(n)
            .filter_map(|price| self.levels.get(&price).map(|lvl| (price, lvl.total())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Total resting quantity at `price`, zero if the level does not exist.
    pub(crate) fn total_at(&self, price: u64) -> u64 {
        self.levels.get(&price).map(PriceLevel::total).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn level(&self, price: u64) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }
}

/// A per-symbol limit order book: two [`BookSide`]s and the arrival-sequence
/// counter that FIFO time priority is measured against.
#[derive(Debug)]
pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
    next_seq: u64,
    quarantined: bool,
}

impl OrderBook {
    pub fn new() -> Self {
        OrderBook {
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            next_seq: 0,
            quarantined: false,
        }
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Rests a limit remainder on its own side, stamping the next arrival
    /// sequence.
    pub fn rest(&mut self, id: u64, side: Side, price: u64, remaining: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.side_mut(side).add_resting(RestingOrder {
            id,
            side,
            price,
            remaining,
            seq,
        });
    }

    /// `(best_bid, best_ask)`; either may be `None`.
    pub fn bbo(&mut self) -> (Option<u64>, Option<u64>) {
        (self.bids.best_price(), self.asks.best_price())
    }

    /// Marks the book unusable after an invariant violation. Submissions
    /// against a quarantined book are rejected without matching.
    pub fn quarantine(&mut self) {
        self.quarantined = true;
    }

    pub fn is_quarantined(&self) -> bool {
        self.quarantined
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Best bid and offer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bbo {
    pub bid: Option<u64>,
    pub ask: Option<u64>,
}

/// An aggregated view of the book published after every mutation and served
/// on the read path: bids descending, asks ascending, one entry per level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataSnapshot {
    pub timestamp: SystemTime,
    pub symbol: Symbol,
    pub bbo: Bbo,
    pub bids: Vec<(u64, u64)>,
    pub asks: Vec<(u64, u64)>,
}

impl MarketDataSnapshot {
    /// Captures up to `depth` levels per side. Needs `&mut` because best-price
    /// discovery prunes the heaps.
    pub fn capture(symbol: Symbol, book: &mut OrderBook, depth: usize) -> Self {
        let (bid, ask) = book.bbo();
        MarketDataSnapshot {
            timestamp: SystemTime::now(),
            symbol,
            bbo: Bbo { bid, ask },
            bids: book.side(Side::Buy).depth(depth),
            asks: book.side(Side::Sell).depth(depth),
        }
    }

    /// What a read on an unknown symbol returns: empty sides, null bbo.
    pub fn empty(symbol: Symbol) -> Self {
        MarketDataSnapshot {
            timestamp: SystemTime::now(),
            symbol,
            bbo: Bbo {
                bid: None,
                ask: None,
            },
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }
}
