//! Randomized order flow for demos: a drifting fair value, passive quotes
//! around it, and a slice of taker traffic crossing the spread.

use crate::{orders::SubmissionResult, symbol::Symbol};
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use reqwest::Client;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct SimConfig {
    pub api_base: String,
    pub symbol: Symbol,
    pub run_secs: Option<u64>,
    /// Poisson arrival rate of orders, per second.
    pub orders_per_sec: f64,
    /// Std-dev of the random walk applied to fair value per order.
    pub mid_sigma: f64,
    /// Mean order size; sizes are exponentially distributed.
    pub mean_qty: f64,
    /// Share of orders sent as takers (ioc or market) instead of quotes.
    pub taker_ratio: f64,
}

/// One order the flow model decided to send.
struct OrderPlan {
    side: &'static str,
    order_type: &'static str,
    price: Option<u64>,
    quantity: u64,
}

/// Drives the synthetic flow: fair value follows a random walk, makers
/// quote one spread away from it on their own side, takers cross it.
struct FlowModel {
    mid: f64,
    spread: f64,
    drift: Normal<f64>,
    size: Exp<f64>,
    taker_ratio: f64,
}

impl FlowModel {
    fn new(cfg: &SimConfig) -> anyhow::Result<Self> {
        Ok(FlowModel {
            mid: 50.0,
            spread: 1.0,
            drift: Normal::new(0.0, cfg.mid_sigma)?,
            size: Exp::new(1.0 / cfg.mean_qty.max(0.5))?,
            taker_ratio: cfg.taker_ratio.clamp(0.0, 1.0),
        })
    }

    fn next_plan(&mut self) -> OrderPlan {
        let mut rng = rand::rng();
        self.mid = (self.mid + self.drift.sample(&mut rng)).max(2.0);
        let quantity = self.size.sample(&mut rng).round().max(1.0) as u64;
        let buying = rng.random_bool(0.5);
        let side = if buying { "buy" } else { "sell" };

        if rng.random_bool(self.taker_ratio) {
            // takers: mostly ioc priced through the spread, sometimes a
            // pure market sweep
            if rng.random_bool(0.25) {
                return OrderPlan {
                    side,
                    order_type: "market",
                    price: None,
                    quantity,
                };
            }
            let through = if buying {
                self.mid + self.spread
            } else {
                self.mid - self.spread
            };
            OrderPlan {
                side,
                order_type: "ioc",
                price: Some(to_ticks(through)),
                quantity,
            }
        } else {
            let passive = if buying {
                self.mid - self.spread
            } else {
                self.mid + self.spread
            };
            OrderPlan {
                side,
                order_type: "limit",
                price: Some(to_ticks(passive)),
                quantity,
            }
        }
    }
}

fn to_ticks(price: f64) -> u64 {
    price.round().max(1.0) as u64
}

/// Position and cash impact of the fills this flow was party to.
#[derive(Default)]
struct FlowStats {
    position: i64,
    cash: f64,
    orders_sent: u64,
    fills: u64,
}

impl FlowStats {
    fn record(&mut self, plan: &OrderPlan, result: &SubmissionResult) {
        self.orders_sent += 1;
        for trade in &result.trades {
            self.fills += 1;
            let qty = trade.quantity as i64;
            let notional = (trade.price * trade.quantity) as f64;
            if plan.side == "buy" {
                self.position += qty;
                self.cash -= notional;
            } else {
                self.position -= qty;
                self.cash += notional;
            }
        }
    }
}

/// Fires orders at the engine until the deadline or shutdown, whichever
/// comes first. Transport hiccups are logged and skipped, never fatal.
pub async fn run_simulation(cfg: SimConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
    let arrivals = Exp::new(cfg.orders_per_sec)?;
    let mut model = FlowModel::new(&cfg)?;
    let mut stats = FlowStats::default();
    let started = Instant::now();
    let deadline = cfg.run_secs.map(Duration::from_secs);

    loop {
        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                break;
            }
        }

        let pause = Duration::from_secs_f64(arrivals.sample(&mut rand::rng()));
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested; stopping order flow");
                break;
            }
            _ = tokio::time::sleep(pause) => {}
        }

        let plan = model.next_plan();
        let sent = client
            .post(format!("{}/orders", cfg.api_base))
            .json(&json!({
                "symbol": cfg.symbol.code(),
                "side": plan.side,
                "order_type": plan.order_type,
                "price": plan.price,
                "quantity": plan.quantity,
            }))
            .send()
            .await;

        let result: SubmissionResult = match sent {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.json().await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(error = %e, "unreadable submission result");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "submission refused");
                    continue;
                }
            },
            Err(e) => {
                warn!(error = %e, "engine unreachable");
                continue;
            }
        };

        stats.record(&plan, &result);
        info!(
            side = plan.side,
            order_type = plan.order_type,
            quantity = plan.quantity,
            status = ?result.status,
            fills = result.trades.len(),
            position = stats.position,
            cash = format_args!("{:.0}", stats.cash),
            "order placed"
        );
    }

    info!(
        orders = stats.orders_sent,
        fills = stats.fills,
        position = stats.position,
        cash = format_args!("{:.0}", stats.cash),
        "simulation finished"
    );
    Ok(())
}
