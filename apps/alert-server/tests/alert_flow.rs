//! Alert Flow Integration Tests
//!
//! Drives a real server over WebSocket: subscribe, tick, receive alerts,
//! unsubscribe, disconnect cleanup.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use alert_server::infrastructure::config::UpstreamSettings;
use alert_server::infrastructure::http;
use alert_server::{
    AlertHub, AlertMonitor, AppState, DashboardClient, MonitorConfig, NotificationDispatcher,
    PriceSource, PriceSourceError, ResilientPriceSource, SubscriptionRegistry, Ticker,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Price source with settable prices; unknown tickers fail.
#[derive(Default)]
struct FixedPrices(Mutex<HashMap<String, f64>>);

impl FixedPrices {
    fn set(&self, ticker: &str, price: f64) {
        self.0.lock().insert(ticker.to_string(), price);
    }
}

#[async_trait]
impl PriceSource for FixedPrices {
    async fn fetch_price(&self, ticker: &Ticker) -> Result<f64, PriceSourceError> {
        self.0
            .lock()
            .get(ticker.as_str())
            .copied()
            .ok_or_else(|| PriceSourceError::NoPrice {
                ticker: ticker.to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

struct TestServer {
    addr: SocketAddr,
    registry: Arc<SubscriptionRegistry>,
    prices: Arc<FixedPrices>,
    monitor: AlertMonitor,
    cancel: CancellationToken,
}

impl TestServer {
    async fn start() -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(16));
        let prices = Arc::new(FixedPrices::default());
        let monitor = AlertMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            Arc::new(ResilientPriceSource::new(
                Arc::clone(&prices) as Arc<dyn PriceSource>,
                Duration::from_millis(500),
            )),
            MonitorConfig::default(),
        );

        let state = AppState {
            hub: Arc::new(AlertHub::new(Arc::clone(&registry), dispatcher)),
            dashboard: Arc::new(DashboardClient::new(&UpstreamSettings::default()).unwrap()),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(http::serve(listener, state, cancel.clone()));

        Self {
            addr,
            registry,
            prices,
            monitor,
            cancel,
        }
    }

    async fn connect(&self, path: &str) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}{path}", self.addr))
            .await
            .unwrap();
        client
    }

    async fn wait_for_conditions(&self, expected: usize) {
        wait_until(|| self.registry.stats().condition_count == expected).await;
    }

    async fn wait_for_connections(&self, expected: usize) {
        wait_until(|| self.registry.stats().connection_count == expected).await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string().into())).await.unwrap();
}

fn request(kind: &str, ticker: &str, threshold: f64, direction: &str) -> Value {
    json!({ "type": kind, "ticker": ticker, "threshold": threshold, "alertType": direction })
}

async fn next_json(client: &mut Client) -> Option<Value> {
    loop {
        match timeout(Duration::from_millis(300), client.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            _ => return None,
        }
    }
}

#[tokio::test]
async fn subscriber_receives_alert() {
    let server = TestServer::start().await;
    server.prices.set("AAPL", 155.0);
    let mut client = server.connect("/ws").await;

    send(&mut client, request("subscribe", "AAPL", 150.0, "above")).await;
    server.wait_for_conditions(1).await;
    server.monitor.tick().await;

    let alert = next_json(&mut client).await.expect("alert pushed");
    assert_eq!(alert["type"], "alert");
    assert_eq!(alert["data"]["ticker"], "AAPL");
    assert_eq!(alert["data"]["price"], 155.0);
    assert_eq!(alert["data"]["threshold"], 150.0);
    assert_eq!(alert["data"]["alertType"], "above");
    assert!(alert["data"]["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn root_path_also_upgrades() {
    let server = TestServer::start().await;
    server.prices.set("MSFT", 290.0);
    let mut client = server.connect("/").await;

    send(&mut client, request("subscribe", "msft", 300.0, "below")).await;
    server.wait_for_conditions(1).await;
    server.monitor.tick().await;

    let alert = next_json(&mut client).await.expect("alert pushed");
    assert_eq!(alert["data"]["ticker"], "MSFT");
    assert_eq!(alert["data"]["alertType"], "below");
}

#[tokio::test]
async fn unsubscribe_stops_alerts() {
    let server = TestServer::start().await;
    server.prices.set("AAPL", 155.0);
    let mut client = server.connect("/ws").await;

    send(&mut client, request("subscribe", "AAPL", 150.0, "above")).await;
    server.wait_for_conditions(1).await;
    send(&mut client, request("unsubscribe", "AAPL", 150.0, "above")).await;
    server.wait_for_conditions(0).await;
    server.monitor.tick().await;

    assert!(next_json(&mut client).await.is_none());
}

#[tokio::test]
async fn condition_refires_each_tick() {
    let server = TestServer::start().await;
    server.prices.set("AAPL", 160.0);
    let mut client = server.connect("/ws").await;

    send(&mut client, request("subscribe", "AAPL", 150.0, "above")).await;
    server.wait_for_conditions(1).await;
    server.monitor.tick().await;
    server.monitor.tick().await;

    assert!(next_json(&mut client).await.is_some());
    assert!(next_json(&mut client).await.is_some());
}

#[tokio::test]
async fn alerts_only_reach_owner() {
    let server = TestServer::start().await;
    server.prices.set("AAPL", 155.0);
    let mut owner = server.connect("/ws").await;
    let mut bystander = server.connect("/ws").await;

    send(&mut owner, request("subscribe", "AAPL", 150.0, "above")).await;
    server.wait_for_conditions(1).await;
    server.monitor.tick().await;

    assert!(next_json(&mut owner).await.is_some());
    assert!(next_json(&mut bystander).await.is_none());
}

#[tokio::test]
async fn garbage_does_not_close_connection() {
    let server = TestServer::start().await;
    server.prices.set("AAPL", 155.0);
    let mut client = server.connect("/ws").await;

    client.send(Message::Text("not json".into())).await.unwrap();
    send(&mut client, json!({ "type": "subscribe", "ticker": "AAPL" })).await;
    client
        .send(Message::Binary(vec![1_u8, 2, 3].into()))
        .await
        .unwrap();
    send(&mut client, request("subscribe", "AAPL", 150.0, "above")).await;
    server.wait_for_conditions(1).await;
    server.monitor.tick().await;

    assert!(next_json(&mut client).await.is_some());
}

#[tokio::test]
async fn failing_source_suppresses_alerts() {
    let server = TestServer::start().await;
    let mut client = server.connect("/ws").await;

    send(&mut client, request("subscribe", "XYZ", 0.0, "above")).await;
    server.wait_for_conditions(1).await;
    let report = server.monitor.tick().await;

    assert_eq!(report.fallback_samples, 1);
    assert!(next_json(&mut client).await.is_none());
    assert_eq!(server.registry.stats().connection_count, 1);
}

#[tokio::test]
async fn disconnect_removes_connection() {
    let server = TestServer::start().await;
    let mut client = server.connect("/ws").await;
    server.wait_for_connections(1).await;

    send(&mut client, request("subscribe", "AAPL", 150.0, "above")).await;
    server.wait_for_conditions(1).await;
    client.close(None).await.unwrap();

    server.wait_for_connections(0).await;
    assert_eq!(server.registry.stats().condition_count, 0);
    let report = server.monitor.tick().await;
    assert_eq!(report.tickers, 0);
}

#[tokio::test]
async fn url_unsafe_ticker_is_ignored() {
    let server = TestServer::start().await;
    server.prices.set("AAPL", 155.0);
    let mut client = server.connect("/ws").await;

    send(&mut client, request("subscribe", "AAPL?X", 150.0, "above")).await;
    send(&mut client, request("subscribe", "AAPL", 150.0, "above")).await;
    server.wait_for_conditions(1).await;
    let report = server.monitor.tick().await;

    assert_eq!(report.tickers, 1);
    let alert = next_json(&mut client).await.expect("alert pushed");
    assert_eq!(alert["data"]["ticker"], "AAPL");
    assert!(next_json(&mut client).await.is_none());
}
