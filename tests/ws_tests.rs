use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use matchbook_engine::{
    api::{WsFrame, router},
    orders::Side,
    state::AppState,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

type WsConn = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>) {
    let state = AppState::new();
    let app: Router = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let ready = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(r) = client.get(format!("{}/book/PING", base)).send().await {
                if r.status().is_success() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok();
    assert!(ready, "server did not become ready in time");

    (base.to_string(), handle)
}

async fn post_order(client: &reqwest::Client, base: &str, body: &Value) {
    client
        .post(format!("{}/orders", base))
        .json(body)
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();
}

async fn next_frame(ws: &mut WsConn) -> WsFrame {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for ws frame")
        .expect("ws stream ended")
        .expect("ws transport error");
    match msg {
        tungstenite::Message::Text(text) => {
            serde_json::from_str(&text).expect("undecodable ws frame")
        }
        other => panic!("unexpected non-text frame: {other:?}"),
    }
}

#[tokio::test]
async fn websocket_greets_with_state_then_streams_fills() {
    let (http_base, server) = spawn_server().await;
    let client = reqwest::Client::new();

    // liquidity rests before anyone subscribes
    post_order(
        &client,
        &http_base,
        &json!({
            "side": "sell",
            "order_type": "limit",
            "price": 205,
            "quantity": 7,
            "symbol": "SOL-USDT"
        }),
    )
    .await;

    let ws_url = http_base.replace("http://", "ws://") + "/ws/SOL-USDT";
    let (mut ws, _resp) = connect_async(&ws_url).await.expect("ws connect");

    // the greeting snapshot must reflect state from before the subscription
    match next_frame(&mut ws).await {
        WsFrame::MarketData(snap) => {
            assert_eq!(snap.asks, vec![(205, 7)]);
            assert!(snap.bids.is_empty());
            assert_eq!(snap.bbo.ask, Some(205));
            assert_eq!(snap.bbo.bid, None);
        }
        WsFrame::Trade(t) => panic!("greeting must be a snapshot, got trade {}", t.trade_id),
    }

    // an ioc taker crosses; the feed must carry both the fill and the
    // shrunken ask level, in whichever order they fan out
    post_order(
        &client,
        &http_base,
        &json!({
            "side": "buy",
            "order_type": "ioc",
            "price": 205,
            "quantity": 3,
            "symbol": "SOL-USDT"
        }),
    )
    .await;

    let mut saw_fill = false;
    let mut saw_book_update = false;
    for _ in 0..4 {
        match next_frame(&mut ws).await {
            WsFrame::Trade(trade) => {
                assert_eq!((trade.price, trade.quantity), (205, 3));
                assert_eq!(trade.aggressor_side, Side::Buy);
                assert_ne!(trade.maker_order_id, trade.taker_order_id);
                saw_fill = true;
            }
            WsFrame::MarketData(snap) => {
                if snap.asks == vec![(205, 4)] {
                    saw_book_update = true;
                }
            }
        }
        if saw_fill && saw_book_update {
            break;
        }
    }
    assert!(saw_fill, "no trade frame arrived after the ioc fill");
    assert!(saw_book_update, "no post-fill book update arrived");

    server.abort();
}

#[tokio::test]
async fn websocket_feed_is_scoped_to_its_symbol() {
    let (http_base, server) = spawn_server().await;
    let ws_url = http_base.replace("http://", "ws://") + "/ws/ETH-USDT";

    let (mut ws, _resp) = connect_async(&ws_url).await.expect("ws connect");

    // drain the greeting snapshot
    let _ = next_frame(&mut ws).await;

    // activity on another symbol must not reach this subscriber
    let client = reqwest::Client::new();
    post_order(
        &client,
        &http_base,
        &json!({
            "side": "buy",
            "order_type": "limit",
            "price": 48,
            "quantity": 5,
            "symbol": "BTC-USDT"
        }),
    )
    .await;

    let quiet = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(quiet.is_err(), "ETH subscriber saw BTC activity");

    server.abort();
}
