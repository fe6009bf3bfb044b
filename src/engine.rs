use crate::{
    errors::RejectReason,
    matcher,
    orderbook::{Bbo, MarketDataSnapshot, OrderBook},
    orders::{OrderRequest, OrderStatus, SubmissionResult},
    pubsub::PubSub,
    symbol::Symbol,
    trade::Trade,
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{sync::broadcast, task};
use tracing::{debug, error};

/// Most levels per side a read or snapshot will ever return.
pub const MAX_DEPTH: usize = 1000;

/// Levels per side captured in the snapshots published after mutations.
const SNAPSHOT_DEPTH: usize = 100;

/// The engine: a lazily-populated `symbol -> OrderBook` registry, global id
/// sequences and the publish side of [`PubSub`].
///
/// Each book is guarded by its own mutex, the sole mutual-exclusion gate for
/// that symbol. Matching steps are CPU-bound and run on the blocking pool,
/// holding the book lock start to finish, so submissions for one symbol are
/// serialized in lock-acquisition order while distinct symbols match fully
/// in parallel. The async caller suspends only while awaiting the pool task.
#[derive(Clone)]
pub struct MatchingEngine {
    books: Arc<RwLock<HashMap<Symbol, Arc<Mutex<OrderBook>>>>>,
    next_order_id: Arc<AtomicU64>,
    next_trade_id: Arc<AtomicU64>,
    pubsub: PubSub,
}

impl MatchingEngine {
    pub fn new() -> Self {
        MatchingEngine {
            books: Arc::new(RwLock::new(HashMap::new())),
            next_order_id: Arc::new(AtomicU64::new(0)),
            next_trade_id: Arc::new(AtomicU64::new(0)),
            pubsub: PubSub::new(),
        }
    }

    /// The symbol's book, created on first submission.
    fn book(&self, symbol: &Symbol) -> Arc<Mutex<OrderBook>> {
        {
            let books = self.books.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(book) = books.get(symbol) {
                return Arc::clone(book);
            }
        }
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            books
                .entry(symbol.clone())
                .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new()))),
        )
    }

    /// Reads never create a book; an unknown symbol is an empty view.
    fn existing_book(&self, symbol: &Symbol) -> Option<Arc<Mutex<OrderBook>>> {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .map(Arc::clone)
    }

    /// Submits an order: assigns its id, runs the matching step on the
    /// blocking pool under the symbol lock, then fans out the trades and a
    /// post-state snapshot once the mutation is committed.
    ///
    /// Publish failures never affect the returned result.
    pub async fn submit(&self, request: OrderRequest) -> SubmissionResult {
        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed) + 1;
        let symbol = request.symbol.clone();
        let quantity = request.quantity;
        let book = self.book(&symbol);
        let trade_ids = Arc::clone(&self.next_trade_id);

        debug!(%symbol, order_id, side = ?request.side, order_type = ?request.order_type, quantity, "submission");

        let outcome = task::spawn_blocking(move || {
            let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);
            match matcher::execute(&mut book, &request, order_id, &trade_ids) {
                Ok(result) => {
                    // Snapshot inside the lock so it reflects exactly this
                    // submission's post-state; publish happens outside.
                    let snapshot = book_mutated(&result).then(|| {
                        MarketDataSnapshot::capture(request.symbol, &mut book, SNAPSHOT_DEPTH)
                    });
                    Ok((result, snapshot))
                }
                Err(fault) => {
                    book.quarantine();
                    Err(fault)
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok((result, snapshot))) => {
                for trade in &result.trades {
                    self.pubsub.publish_trade(&symbol, trade.clone());
                }
                if let Some(snapshot) = snapshot {
                    self.pubsub.publish_marketdata(&symbol, snapshot);
                }
                result
            }
            Ok(Err(fault)) => {
                error!(%symbol, order_id, %fault, "invariant violation; book quarantined");
                SubmissionResult::rejected(order_id, quantity, &RejectReason::Quarantined)
            }
            Err(join_error) => {
                error!(%symbol, order_id, error = %join_error, "matching task failed");
                SubmissionResult::rejected(order_id, quantity, &RejectReason::Internal)
            }
        }
    }

    /// Best bid and offer, taken under a brief book lock for a consistent
    /// view. Unknown symbols read as empty.
    pub fn bbo(&self, symbol: &Symbol) -> Bbo {
        match self.existing_book(symbol) {
            Some(book) => {
                let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);
                let (bid, ask) = book.bbo();
                Bbo { bid, ask }
            }
            None => Bbo {
                bid: None,
                ask: None,
            },
        }
    }

    /// Aggregated depth, up to `levels` per side (clamped to `1..=MAX_DEPTH`).
    pub fn depth(&self, symbol: &Symbol, levels: usize) -> MarketDataSnapshot {
        let levels = levels.clamp(1, MAX_DEPTH);
        match self.existing_book(symbol) {
            Some(book) => {
                let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);
                MarketDataSnapshot::capture(symbol.clone(), &mut book, levels)
            }
            None => MarketDataSnapshot::empty(symbol.clone()),
        }
    }

    pub fn subscribe_trades(&self, symbol: &Symbol) -> broadcast::Receiver<Trade> {
        self.pubsub.subscribe_trades(symbol)
    }

    pub fn subscribe_marketdata(
        &self,
        symbol: &Symbol,
    ) -> broadcast::Receiver<MarketDataSnapshot> {
        self.pubsub.subscribe_marketdata(symbol)
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        MatchingEngine::new()
    }
}

/// Whether a completed submission changed book state: it traded, or it
/// rested a remainder. Rejections and empty-book cancels touch nothing.
fn book_mutated(result: &SubmissionResult) -> bool {
    !result.trades.is_empty() || result.status == OrderStatus::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{OrderType, Side};

    fn symbol(code: &str) -> Symbol {
        code.parse().unwrap()
    }

    fn request(
        symbol: &Symbol,
        side: Side,
        order_type: OrderType,
        price: Option<u64>,
        quantity: u64,
    ) -> OrderRequest {
        OrderRequest {
            symbol: symbol.clone(),
            side,
            order_type,
            price,
            quantity,
        }
    }

    #[tokio::test]
    async fn order_ids_are_assigned_monotonically() {
        let engine = MatchingEngine::new();
        let btc = symbol("BTC-USDT");

        let a = engine
            .submit(request(&btc, Side::Buy, OrderType::Limit, Some(50), 1))
            .await;
        let b = engine
            .submit(request(&btc, Side::Buy, OrderType::Limit, Some(51), 1))
            .await;
        assert!(b.order_id > a.order_id);
    }

    #[tokio::test]
    async fn submit_matches_against_resting_liquidity() {
        let engine = MatchingEngine::new();
        let btc = symbol("BTC-USDT");

        let sell = engine
            .submit(request(&btc, Side::Sell, OrderType::Limit, Some(100), 5))
            .await;
        assert_eq!(sell.status, OrderStatus::Accepted);

        let buy = engine
            .submit(request(&btc, Side::Buy, OrderType::Market, None, 2))
            .await;
        assert_eq!(buy.status, OrderStatus::Filled);
        assert_eq!(buy.trades.len(), 1);
        assert_eq!(buy.trades[0].maker_order_id, sell.order_id);
        assert_eq!(buy.trades[0].price, 100);

        let bbo = engine.bbo(&btc);
        assert_eq!(bbo.ask, Some(100));
    }

    #[tokio::test]
    async fn books_are_isolated_per_symbol() {
        let engine = MatchingEngine::new();
        let btc = symbol("BTC-USDT");
        let eth = symbol("ETH-USDT");

        engine
            .submit(request(&btc, Side::Sell, OrderType::Limit, Some(100), 5))
            .await;
        let result = engine
            .submit(request(&eth, Side::Buy, OrderType::Market, None, 5))
            .await;

        // ETH has no liquidity; the BTC ask must not be touched.
        assert_eq!(result.status, OrderStatus::Canceled);
        assert_eq!(result.filled_quantity, 0);
        assert_eq!(engine.bbo(&btc).ask, Some(100));
    }

    #[tokio::test]
    async fn reads_on_unknown_symbols_are_empty_not_errors() {
        let engine = MatchingEngine::new();
        let ghost = symbol("NO-SUCH");

        let bbo = engine.bbo(&ghost);
        assert!(bbo.bid.is_none() && bbo.ask.is_none());

        let snap = engine.depth(&ghost, 10);
        assert!(snap.bids.is_empty() && snap.asks.is_empty());
    }

    #[tokio::test]
    async fn depth_is_clamped() {
        let engine = MatchingEngine::new();
        let btc = symbol("BTC-USDT");
        for price in 1..=5u64 {
            engine
                .submit(request(&btc, Side::Buy, OrderType::Limit, Some(price), 1))
                .await;
        }
        // levels=0 clamps to 1
        let snap = engine.depth(&btc, 0);
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.bids[0], (5, 1));
    }

    #[tokio::test]
    async fn trades_and_snapshots_fan_out_to_subscribers() {
        let engine = MatchingEngine::new();
        let btc = symbol("BTC-USDT");
        let mut trades = engine.subscribe_trades(&btc);
        let mut marketdata = engine.subscribe_marketdata(&btc);

        engine
            .submit(request(&btc, Side::Sell, OrderType::Limit, Some(100), 3))
            .await;
        // resting mutation publishes a snapshot but no trade
        let snap = marketdata.recv().await.unwrap();
        assert_eq!(snap.asks, vec![(100, 3)]);

        engine
            .submit(request(&btc, Side::Buy, OrderType::Market, None, 1))
            .await;
        let trade = trades.recv().await.unwrap();
        assert_eq!((trade.price, trade.quantity), (100, 1));
        let snap = marketdata.recv().await.unwrap();
        assert_eq!(snap.asks, vec![(100, 2)]);
    }

    #[tokio::test]
    async fn rejected_submissions_publish_nothing() {
        let engine = MatchingEngine::new();
        let btc = symbol("BTC-USDT");
        let mut marketdata = engine.subscribe_marketdata(&btc);

        let result = engine
            .submit(request(&btc, Side::Buy, OrderType::Limit, None, 5))
            .await;
        assert_eq!(result.status, OrderStatus::Rejected);
        assert!(marketdata.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_submissions_on_one_symbol_serialize() {
        let engine = MatchingEngine::new();
        let btc = symbol("BTC-USDT");

        // 20 concurrent one-lot sells at the same price; every submission
        // holds the book lock for its whole matching step, so all 20 must
        // rest and the level total must be exact.
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let engine = engine.clone();
            let btc = btc.clone();
            tasks.spawn(async move {
                engine
                    .submit(request(&btc, Side::Sell, OrderType::Limit, Some(100), 1))
                    .await
            });
        }
        let results = tasks.join_all().await;
        assert!(results.iter().all(|r| r.status == OrderStatus::Accepted));

        let snap = engine.depth(&btc, 10);
        assert_eq!(snap.asks, vec![(100, 20)]);
    }
}
