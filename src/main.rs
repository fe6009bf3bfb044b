use axum::Router;
use clap::{Parser, Subcommand};
use matchbook_engine::symbol::Symbol;
use matchbook_engine::{api, simulate, state::AppState};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "matchbook")]
#[command(version = "0.1", about = "A multi-symbol limit-order matching engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server with a noisy order-flow simulator against it
    Simulate { port: u16, secs: u64 },
    /// Run the HTTP/WS server
    Server { port: u16 },
}

fn default_symbol() -> Symbol {
    "BTC-USDT".parse().expect("static symbol is valid")
}

async fn wait_for_server(api_base: &str, symbol: &Symbol) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    loop {
        match client
            .get(format!("{}/bbo/{}", api_base, symbol.code()))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => break,
            _ => tokio::time::sleep(Duration::from_millis(25)).await,
        };
    }
    Ok(())
}

async fn seed_book(ep: &str, symbol: &Symbol) -> anyhow::Result<()> {
    // Seed the book with a resting bid @48 and ask @52
    let client = reqwest::Client::new();
    for (side, price) in &[("buy", 48), ("sell", 52)] {
        client
            .post(format!("{}/orders", ep))
            .json(&json!({
                "side": side,
                "order_type": "limit",
                "price": price,
                "quantity": 10,
                "symbol": symbol.code(),
            }))
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(side, price, "seeded resting orders");
    }
    Ok(())
}

async fn get_app_listener(port: u16, state: AppState) -> anyhow::Result<(TcpListener, Router)> {
    let app = api::router(state);
    let ep = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(ep.clone()).await?;
    Ok((listener, app))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::new();
    // One cancellation token fans the ctrl-c signal out to every task.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => shutdown.cancel(),
                Err(e) => tracing::error!(error = %e, "ctrl-c handler unavailable"),
            }
        });
    }
    let server_token = shutdown.clone();
    let sim_token = shutdown.clone();
    // Setup tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let base = "http://127.0.0.1".to_string();
    match cli.command {
        //runs the server plus a noisy client against it
        Commands::Simulate { port, secs } => {
            let mut handlers = tokio::task::JoinSet::new();
            let (listener, app) = get_app_listener(port, state.clone()).await?;
            handlers.spawn(async move {
                tracing::info!("HTTP/WS server listening on {}", format!("0.0.0.0:{}", port));
                // this will serve until shutdown
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(server_token.cancelled_owned())
                    .await
                {
                    tracing::error!("server exited: {:?}", e);
                }
            });
            let ep = format!("{}:{}", base.clone(), port);
            tracing::info!("end_point: {}", ep);
            let symbol = default_symbol();
            wait_for_server(&ep, &symbol).await?;
            seed_book(&ep, &symbol).await?;
            //start simulator
            handlers.spawn(async move {
                if let Err(e) = simulate::run_simulation(
                    simulate::SimConfig {
                        api_base: ep,
                        symbol,
                        run_secs: if secs == 0 { None } else { Some(secs) },
                        orders_per_sec: 5.0,
                        mid_sigma: 0.5,
                        mean_qty: 3.0,
                        taker_ratio: 0.3,
                    },
                    sim_token,
                )
                .await
                {
                    tracing::error!("Simulation error: {:?}", e);
                }
            });
            handlers.join_all().await;
        }
        Commands::Server { port } => {
            let (listener, app) = get_app_listener(port, state.clone()).await?;
            let svh = tokio::spawn(async move {
                tracing::info!("HTTP/WS server listening on {}", format!("0.0.0.0:{}", port));
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(server_token.cancelled_owned())
                    .await
                {
                    tracing::error!("server exited: {:?}", e);
                }
            });
            svh.await?;
        }
    };
    Ok(())
}
