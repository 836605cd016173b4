// src/core/bus.rs

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::error::ReconError;

/// Outbound side of the event bus. Delivery is assumed at-least-once and ordered per subject.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), ReconError>;
}

/// NATS-backed event bus.
#[derive(Clone)]
pub struct NatsEventBus {
    client: async_nats::Client,
}

impl NatsEventBus {
    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        info!(url, "Connected to event bus.");
        Ok(Self { client })
    }

    pub async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<async_nats::Subscriber, async_nats::SubscribeError> {
        let subscriber = self.client.subscribe(subject.to_string()).await?;
        info!(subject, "Subscribed.");
        Ok(subscriber)
    }

    /// Flushes buffered publications, used on shutdown.
    pub async fn flush(&self) -> Result<(), ReconError> {
        self.client.flush().await.map_err(|e| ReconError::Publish {
            subject: "*".to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), ReconError> {
        debug!(subject, bytes = payload.len(), "Publishing event.");
        self.client
            .publish(subject.to_string(), Bytes::from(payload))
            .await
            .map_err(|e| ReconError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            })
    }
}
