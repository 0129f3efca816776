use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::{Message, Sender};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/messages", get(list_messages).post(send_message))
        .route("/messages/:id", put(edit_message).delete(delete_message))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub ride_id: Uuid,
    pub sender: Sender,
    pub content: String,
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub sender: Sender,
    pub content: String,
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    pub ride_id: Option<Uuid>,
    pub driver: Option<String>,
    pub after: Option<u64>,
    pub limit: Option<usize>,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let message = state
        .conversations
        .append(payload.ride_id, payload.sender, &payload.content)?;
    state.metrics.messages_total.with_label_values(&["append"]).inc();

    Ok(Json(message))
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<EditMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let message = state
        .conversations
        .edit(id, payload.sender, &payload.content)?;
    state.metrics.messages_total.with_label_values(&["edit"]).inc();

    Ok(Json(message))
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Message>, AppError> {
    let message = state.conversations.remove(id)?;
    state.metrics.messages_total.with_label_values(&["remove"]).inc();

    Ok(Json(message))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let messages = match (query.ride_id, query.driver.as_deref()) {
        (Some(ride_id), _) => state.conversations.page(
            ride_id,
            query.after,
            query.limit.unwrap_or(usize::MAX),
        ),
        (None, Some(driver)) => state
            .dispatcher
            .rides_for_driver_name(driver)
            .into_iter()
            .flat_map(|ride| state.conversations.list(ride.id))
            .collect(),
        (None, None) => {
            return Err(AppError::InvalidInput(
                "either ride_id or driver is required".to_string(),
            ));
        }
    };

    Ok(Json(messages))
}
