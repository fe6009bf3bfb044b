use crate::{orderbook::MarketDataSnapshot, symbol::Symbol, trade::Trade};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::broadcast;
use tracing::trace;

/// Ring capacity per subscriber. A subscriber that falls further behind than
/// this skips the missed events instead of stalling the publisher.
const SUBSCRIBER_BUFFER: usize = 256;

struct Topics {
    trades: broadcast::Sender<Trade>,
    marketdata: broadcast::Sender<MarketDataSnapshot>,
}

impl Topics {
    fn new() -> Self {
        let (trades, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        let (marketdata, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Topics { trades, marketdata }
    }
}

/// In-process fan-out of trades and market-data snapshots, two topics per
/// symbol. Delivery is best-effort: no durable buffer, no replay, and a slow
/// subscriber can never block matching.
///
/// The subscriber registry has its own lock, independent of any book lock,
/// and publishing never blocks on it beyond the map read.
#[derive(Clone)]
pub struct PubSub {
    topics: Arc<RwLock<HashMap<Symbol, Topics>>>,
}

impl PubSub {
    pub fn new() -> Self {
        PubSub {
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn with_topics<T>(&self, symbol: &Symbol, f: impl FnOnce(&Topics) -> T) -> T {
        {
            let topics = self
                .topics
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = topics.get(symbol) {
                return f(existing);
            }
        }
        let mut topics = self
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(topics.entry(symbol.clone()).or_insert_with(Topics::new))
    }

    pub fn subscribe_trades(&self, symbol: &Symbol) -> broadcast::Receiver<Trade> {
        self.with_topics(symbol, |t| t.trades.subscribe())
    }

    pub fn subscribe_marketdata(&self, symbol: &Symbol) -> broadcast::Receiver<MarketDataSnapshot> {
        self.with_topics(symbol, |t| t.marketdata.subscribe())
    }

    /// Fans a trade out to current subscribers. A send error just means
    /// nobody is listening.
    pub fn publish_trade(&self, symbol: &Symbol, trade: Trade) {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(t) = topics.get(symbol) {
            if t.trades.send(trade).is_err() {
                trace!(%symbol, "trade published with no subscribers");
            }
        }
    }

    pub fn publish_marketdata(&self, symbol: &Symbol, snapshot: MarketDataSnapshot) {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(t) = topics.get(symbol) {
            if t.marketdata.send(snapshot).is_err() {
                trace!(%symbol, "snapshot published with no subscribers");
            }
        }
    }
}

impl Default for PubSub {
    fn default() -> Self {
        PubSub::new()
    }
}
