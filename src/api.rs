use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, warn};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        FromRequest, Path, Query, Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    engine::MAX_DEPTH,
    orderbook::{Bbo, MarketDataSnapshot},
    orders::{OrderRequest, OrderStatus, SubmissionResult},
    state::AppState,
    symbol::Symbol,
    trade::Trade,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);
fn err(status: StatusCode, msg: &str) -> ApiErr {
    (status, Json(json!({ "error": msg })))
}

/// JSON extractor that logs the offending body (capped preview) before
/// rejecting malformed payloads with 422.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        //capture request details for logging
        let method = req.method().clone();
        let uri = req.uri().clone();
        // read full body
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                //cap body preview to avoid giant logs
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    uri = %uri,
                    body_preview = %preview,
                    "order rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))
            }
        }
    }
}

fn default_depth() -> usize {
    100
}

#[derive(Deserialize)]
pub struct DepthQuery {
    /// Levels per side; clamped to `1..=1000`.
    #[serde(default = "default_depth")]
    depth: usize,
}

/// A websocket frame: either a market-data snapshot or a single trade.
///
/// Serialized as an internally-tagged enum:
/// ```json
/// {"type": "marketdata", "data": { /* snapshot fields */ }}
/// {"type": "trade", "data": { /* trade fields */ }}
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WsFrame {
    MarketData(MarketDataSnapshot),
    Trade(Trade),
}

/// `POST /orders`
///
/// Submits an order to the engine and returns the full
/// [`SubmissionResult`], including any trades it produced.
///
/// Semantic rejections (bad quantity, missing price, unfillable fok) come
/// back as `200` with `"status": "rejected"`; validation belongs to the
/// matcher, not the transport. Only malformed JSON is an HTTP error (422).
pub async fn create_order(
    State(state): State<AppState>,
    LoggedJson(request): LoggedJson<OrderRequest>,
) -> Json<SubmissionResult> {
    let result = state.engine.submit(request).await;
    if result.status == OrderStatus::Rejected {
        warn!(
            order_id = result.order_id,
            reason = result.reason.as_deref().unwrap_or("unknown"),
            "order rejected"
        );
    }
    Json(result)
}

/// `GET /bbo/{symbol}`
///
/// Best bid and offer; both sides `null` for an unknown or empty book.
pub async fn get_bbo(Path(symbol): Path<Symbol>, State(state): State<AppState>) -> Json<Bbo> {
    Json(state.engine.bbo(&symbol))
}

/// `GET /book/{symbol}?depth=n`
///
/// Aggregated depth snapshot: bids descending, asks ascending. An unknown
/// symbol yields an empty snapshot, not an error.
pub async fn get_book(
    Path(symbol): Path<Symbol>,
    Query(q): Query<DepthQuery>,
    State(state): State<AppState>,
) -> Json<MarketDataSnapshot> {
    Json(state.engine.depth(&symbol, q.depth.min(MAX_DEPTH)))
}

/// `GET /ws/{symbol}`
///
/// Upgrades to a WebSocket and streams the symbol's market-data snapshots
/// and trade events.
pub async fn ws_handler(
    Path(symbol): Path<Symbol>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, symbol))
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(text) => socket.send(Message::Text(text.into())).await,
        Err(e) => {
            error!(error = %e, "ws frame serialization failed");
            Ok(())
        }
    }
}

/// Drives one subscriber connection: an initial snapshot, then live frames
/// from the engine's pubsub until either end goes away.
///
/// A subscriber that lags past its buffer skips the missed events (with a
/// warning) rather than slowing the engine down.
pub async fn handle_socket(mut socket: WebSocket, state: AppState, symbol: Symbol) {
    let mut trade_rx = state.engine.subscribe_trades(&symbol);
    let mut md_rx = state.engine.subscribe_marketdata(&symbol);

    //initial snapshot
    let initial = state.engine.depth(&symbol, default_depth());
    if let Err(e) = send_frame(&mut socket, &WsFrame::MarketData(initial)).await {
        error!(%symbol, error = %e, "failed to send initial snapshot");
        return;
    }

    loop {
        tokio::select! {
            res = trade_rx.recv() => match res {
                Ok(trade) => {
                    if send_frame(&mut socket, &WsFrame::Trade(trade)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(%symbol, missed, "trade subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            },
            res = md_rx.recv() => match res {
                Ok(snapshot) => {
                    if send_frame(&mut socket, &WsFrame::MarketData(snapshot)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(%symbol, missed, "marketdata subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                // inbound client frames carry nothing we act on
                Some(Ok(_)) => {}
                // closed or errored
                _ => break,
            },
        }
    }
}

/// Constructs the application's `Router` with all routes and shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/bbo/{symbol}", get(get_bbo))
        .route("/book/{symbol}", get(get_book))
        .route("/ws/{symbol}", get(ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
