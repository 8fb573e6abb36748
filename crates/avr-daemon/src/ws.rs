//! WebSocket feed of bus messages

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use avr_state::DeviceView;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::bus::BusMessage;
use crate::state::AppState;

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    /// Ready device sent on connect
    #[serde(rename = "device")]
    Device(DeviceView),
    /// Live bus message
    #[serde(rename = "event")]
    Event { topic: String, message: BusMessage },
    #[serde(rename = "pong")]
    Pong,
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut bus_events = state.bus.subscribe();

    info!("WebSocket client connected");

    // Send current device list on connect
    for device in state.cache.devices().await {
        if let Ok(json) = serde_json::to_string(&WsMessage::Device(device)) {
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            event = bus_events.recv() => {
                match event {
                    Ok(message) => {
                        let msg = WsMessage::Event { topic: message.topic.clone(), message };
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Bus closed");
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" {
                            if let Ok(pong) = serde_json::to_string(&WsMessage::Pong) {
                                if sender.send(Message::Text(pong.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use avr_core::DeviceId;

    #[test]
    fn test_event_envelope() {
        let msg = WsMessage::Event {
            topic: "sentinel.device.delete".to_string(),
            message: BusMessage {
                topic: "sentinel.device.delete".to_string(),
                module: "onkyo".to_string(),
                id: DeviceId::from("d1"),
                value: None,
            },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({
                "type": "event",
                "data": {
                    "topic": "sentinel.device.delete",
                    "message": { "module": "onkyo", "id": "d1" }
                }
            })
        );
        assert_eq!(
            serde_json::to_string(&WsMessage::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
    }
}
