use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::{Message, Sender};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", content = "message")]
pub enum ConversationEvent {
    Appended(Message),
    Edited(Message),
    Removed(Message),
}

/// Per-ride message threads.
///
/// Message ids come from one process-wide counter, so they are unique across
/// rides and strictly increasing within each ride. Removal is a hard delete.
pub struct ConversationLog {
    threads: DashMap<Uuid, Vec<Message>>,
    message_index: DashMap<u64, Uuid>,
    next_id: AtomicU64,
    events_tx: broadcast::Sender<ConversationEvent>,
}

impl ConversationLog {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            threads: DashMap::new(),
            message_index: DashMap::new(),
            next_id: AtomicU64::new(1),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events_tx.subscribe()
    }

    /// Opens a thread for a ride. Opening twice keeps the existing messages.
    pub fn open(&self, ride_id: Uuid) {
        self.threads.entry(ride_id).or_default();
        debug!(ride_id = %ride_id, "conversation opened");
    }

    pub fn is_open(&self, ride_id: Uuid) -> bool {
        self.threads.contains_key(&ride_id)
    }

    pub fn append(&self, ride_id: Uuid, sender: Sender, content: &str) -> Result<Message, AppError> {
        self.append_at(ride_id, sender, content, Utc::now())
    }

    pub fn append_at(
        &self,
        ride_id: Uuid,
        sender: Sender,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Message, AppError> {
        let content = non_blank(content)?;

        let mut thread = self
            .threads
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("no conversation for ride {ride_id}")))?;

        let message = Message {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            ride_id,
            sender,
            content,
            created_at,
            edited_at: None,
        };

        thread.push(message.clone());
        drop(thread);

        self.message_index.insert(message.id, ride_id);
        let _ = self.events_tx.send(ConversationEvent::Appended(message.clone()));
        info!(ride_id = %ride_id, message_id = message.id, sender = ?sender, "message appended");

        Ok(message)
    }

    /// Replaces the content of a message. `editor` must be the original sender.
    pub fn edit(&self, message_id: u64, editor: Sender, new_content: &str) -> Result<Message, AppError> {
        let content = non_blank(new_content)?;
        let ride_id = self.ride_of(message_id)?;

        let mut thread = self
            .threads
            .get_mut(&ride_id)
            .ok_or_else(|| message_not_found(message_id))?;
        let message = thread
            .iter_mut()
            .find(|message| message.id == message_id)
            .ok_or_else(|| message_not_found(message_id))?;

        if message.sender != editor {
            return Err(AppError::Forbidden(format!(
                "message {message_id} can only be edited by its sender"
            )));
        }

        message.content = content;
        message.edited_at = Some(Utc::now());
        let edited = message.clone();
        drop(thread);

        let _ = self.events_tx.send(ConversationEvent::Edited(edited.clone()));
        info!(ride_id = %ride_id, message_id, "message edited");

        Ok(edited)
    }

    pub fn remove(&self, message_id: u64) -> Result<Message, AppError> {
        let ride_id = self.ride_of(message_id)?;

        let mut thread = self
            .threads
            .get_mut(&ride_id)
            .ok_or_else(|| message_not_found(message_id))?;
        let position = thread
            .iter()
            .position(|message| message.id == message_id)
            .ok_or_else(|| message_not_found(message_id))?;
        let removed = thread.remove(position);
        drop(thread);

        self.message_index.remove(&message_id);
        let _ = self.events_tx.send(ConversationEvent::Removed(removed.clone()));
        info!(ride_id = %ride_id, message_id, "message removed");

        Ok(removed)
    }

    pub fn get(&self, message_id: u64) -> Result<Message, AppError> {
        let ride_id = self.ride_of(message_id)?;
        self.threads
            .get(&ride_id)
            .and_then(|thread| thread.iter().find(|m| m.id == message_id).cloned())
            .ok_or_else(|| message_not_found(message_id))
    }

    /// Messages of a ride ordered by `(created_at, id)`. Unknown rides yield an
    /// empty list.
    pub fn list(&self, ride_id: Uuid) -> Vec<Message> {
        let mut messages = self
            .threads
            .get(&ride_id)
            .map(|thread| thread.clone())
            .unwrap_or_default();

        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        messages
    }

    /// Up to `limit` messages in list order that come after the message
    /// `after_id`, or from the start when `after_id` is `None`.
    pub fn page(&self, ride_id: Uuid, after_id: Option<u64>, limit: usize) -> Vec<Message> {
        let messages = self.list(ride_id);
        let start = match after_id {
            Some(id) => messages
                .iter()
                .position(|message| message.id == id)
                .map_or(messages.len(), |position| position + 1),
            None => 0,
        };

        messages.into_iter().skip(start).take(limit).collect()
    }

    fn ride_of(&self, message_id: u64) -> Result<Uuid, AppError> {
        self.message_index
            .get(&message_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| message_not_found(message_id))
    }
}

fn non_blank(content: &str) -> Result<String, AppError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::EmptyContent);
    }
    Ok(trimmed.to_string())
}

fn message_not_found(message_id: u64) -> AppError {
    AppError::NotFound(format!("message {message_id} not found"))
}
