//! WebSocket push endpoint
//!
//! Clients connect with their JWT, are joined to their private
//! `user:<id>` room, and subscribe to symbol rooms on demand:
//!
//! ```json
//! {"action": "subscribe", "symbol": "AAA"}
//! {"action": "unsubscribe", "symbol": "AAA"}
//! {"action": "ping"}
//! ```

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth;
use crate::core_types::UserId;
use crate::events::{user_room, Event, EventBus};
use crate::gateway::state::AppState;
use crate::gateway::types::ErrorBody;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe { symbol: String },
    Unsubscribe { symbol: String },
    Ping,
}

/// GET /ws?token=...
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let claims = match auth::verify_token(&state.jwt_secret, &params.token) {
        Ok(claims) => claims,
        Err(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new("Invalid or expired token")),
            )
                .into_response();
        }
    };

    let bus = state.bus.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, bus))
}

async fn handle_socket(socket: WebSocket, user_id: UserId, bus: Arc<EventBus>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let subscriber = bus.next_subscriber_id();
    bus.join(&user_room(user_id), subscriber, tx.clone());
    tracing::info!(user_id, subscriber, "WebSocket connected");

    let _ = tx.send(Event::Connected { user_id });

    // Forward bus events to the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle room subscriptions from the client.
    let recv_bus = bus.clone();
    let recv_tx = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Subscribe { symbol }) => {
                            recv_bus.join(&symbol, subscriber, recv_tx.clone());
                        }
                        Ok(ClientMessage::Unsubscribe { symbol }) => {
                            recv_bus.leave(&symbol, subscriber);
                        }
                        Ok(ClientMessage::Ping) => {
                            let _ = recv_tx.send(Event::Pong);
                        }
                        Err(_) => {
                            tracing::debug!(user_id, "Ignoring malformed ws message");
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    bus.leave_all(subscriber);
    tracing::info!(user_id, subscriber, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"action":"subscribe","symbol":"AAA"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { symbol } if symbol == "AAA"));

        let msg: ClientMessage = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"shout"}"#).is_err());
    }
}
