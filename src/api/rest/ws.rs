use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream;
use futures::SinkExt;
use futures::StreamExt;
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::engine::conversation::ConversationEvent;
use crate::models::ride::RideEvent;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
enum FeedEvent {
    Ride(RideEvent),
    Conversation(ConversationEvent),
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let rides = BroadcastStream::new(state.dispatcher.subscribe())
        .filter_map(|result| async move { result.ok().map(FeedEvent::Ride) });
    let conversations = BroadcastStream::new(state.conversations.subscribe())
        .filter_map(|result| async move { result.ok().map(FeedEvent::Conversation) });
    let mut feed = Box::pin(stream::select(rides, conversations));

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize feed event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
