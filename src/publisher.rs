//! Outbound domain events

use async_trait::async_trait;
use std::sync::Mutex;
use crate::domain::events::GroupBuyEvent;

/// Publishing happens after the write commits, so failures are logged by
/// the caller and never undo state.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &GroupBuyEvent) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish event: {0}")]
    Transport(String),
}

pub struct NatsPublisher { client: async_nats::Client }

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &GroupBuyEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.client.publish(event.subject(), payload.into()).await.map_err(|e| PublishError::Transport(e.to_string()))
    }
}

/// Emits events as log lines when no message bus is configured.
#[derive(Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &GroupBuyEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(subject = %event.subject(), group_id = %event.group_id(), %payload, "group buy event");
        Ok(())
    }
}

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingPublisher { events: Mutex<Vec<GroupBuyEvent>> }

impl RecordingPublisher {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<GroupBuyEvent> { self.events.lock().unwrap_or_else(|e| e.into_inner()).clone() }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &GroupBuyEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
        Ok(())
    }
}
