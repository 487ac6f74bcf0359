//! # Message Bus
//!
//! Topic-based publish/subscribe with at-least-once delivery. Each
//! publication reaches one consumer per consumer group; there is no
//! ordering guarantee across topics.

pub mod memory;
pub mod message;

pub use memory::InMemoryBus;
pub use message::{ArtifactKind, ArtifactRef, Interest, Message, MessageKind};

use crate::error::BusError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Topic carrying artifact announcements for every agent
pub const ARTIFACT_EVENTS: &str = "artifact_events";

/// A message together with the topic it arrived on
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub message: Message,
}

/// Stream of deliveries for one consumer
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { rx }
    }

    /// Wait for the next delivery. `None` once the bus has dropped this consumer.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Take a delivery if one is already queued
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BusError>;

    async fn subscribe(&self, topics: &[&str], group: &str) -> Result<Subscription, BusError>;
}
