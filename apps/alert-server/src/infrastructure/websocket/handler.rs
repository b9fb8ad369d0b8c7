//! WebSocket session driver.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::{SharedHub, messages};
use crate::domain::alert::NotificationEvent;

/// Upgrade an HTTP request into an alert session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<SharedHub>) -> Response {
    ws.on_upgrade(move |socket| run_session(hub, socket))
}

async fn run_session(hub: SharedHub, socket: WebSocket) {
    let (id, outbound) = match hub.connect() {
        Ok(admitted) => admitted,
        Err(e) => {
            tracing::error!(error = %e, "Failed to admit connection");
            return;
        }
    };

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_alerts(sink, outbound));

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => hub.handle_text(id, text.as_str()),
                Some(Ok(Message::Binary(_))) => hub.handle_binary(id),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %id, error = %e, "WebSocket read failed");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    hub.disconnect(id);
    writer.abort();
}

async fn write_alerts(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<NotificationEvent>,
) {
    while let Some(event) = outbound.recv().await {
        let text = match messages::encode_alert(&event) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(ticker = %event.ticker, error = %e, "Failed to encode alert");
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}
