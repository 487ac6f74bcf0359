//! In-process bus used by the CLI runner and the tests.

use super::{Delivery, Message, MessageBus, Subscription};
use crate::error::BusError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

struct Consumer {
    topics: HashSet<String>,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct Group {
    consumers: Vec<Consumer>,
    cursor: usize,
}

impl Group {
    /// Round-robin over the group's live consumers of `topic`.
    fn deliver(&mut self, delivery: &Delivery) -> bool {
        self.consumers.retain(|c| !c.tx.is_closed());
        let matching: Vec<usize> = self
            .consumers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.topics.contains(&delivery.topic))
            .map(|(i, _)| i)
            .collect();
        if matching.is_empty() {
            return false;
        }
        let index = matching[self.cursor % matching.len()];
        self.cursor = self.cursor.wrapping_add(1);
        self.consumers[index].tx.send(delivery.clone()).is_ok()
    }
}

/// Deliveries kept for inspection by [`InMemoryBus::new`]
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

#[derive(Default)]
struct BusState {
    groups: HashMap<String, Group>,
    history: VecDeque<Delivery>,
}

/// In-memory bus with consumer groups and unbounded consumer queues
pub struct InMemoryBus {
    state: Mutex<BusState>,
    history_limit: usize,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the latest `limit` publications; 0 keeps none
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            history_limit: limit,
        }
    }

    /// Every message published on `topic`, in publication order
    pub fn published(&self, topic: &str) -> Vec<Message> {
        match self.state.lock() {
            Ok(state) => state
                .history
                .iter()
                .filter(|d| d.topic == topic)
                .map(|d| d.message.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn published_count(&self) -> usize {
        self.state.lock().map(|s| s.history.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BusError> {
        if topic.is_empty() {
            return Err(BusError::EmptyTopic);
        }
        let mut state = self
            .state
            .lock()
            .map_err(|e| BusError::Closed(format!("Lock error: {}", e)))?;

        let delivery = Delivery {
            topic: topic.to_string(),
            message,
        };
        let mut delivered = 0;
        for group in state.groups.values_mut() {
            if group.deliver(&delivery) {
                delivered += 1;
            }
        }
        tracing::debug!(
            topic,
            message_id = %delivery.message.id,
            groups = delivered,
            "Published message"
        );
        if self.history_limit > 0 {
            if state.history.len() >= self.history_limit {
                state.history.pop_front();
            }
            state.history.push_back(delivery);
        }
        Ok(())
    }

    async fn subscribe(&self, topics: &[&str], group: &str) -> Result<Subscription, BusError> {
        if topics.iter().any(|t| t.is_empty()) {
            return Err(BusError::EmptyTopic);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self
            .state
            .lock()
            .map_err(|e| BusError::Closed(format!("Lock error: {}", e)))?;
        state
            .groups
            .entry(group.to_string())
            .or_default()
            .consumers
            .push(Consumer {
                topics: topics.iter().map(|t| t.to_string()).collect(),
                tx,
            });
        Ok(Subscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageKind;

    fn question(content: &str) -> Message {
        Message::new(MessageKind::Question, "conv-1").with_content(content)
    }

    #[tokio::test]
    async fn test_each_group_receives_once() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe(&["interviewer_enduser"], "enduser").await.unwrap();
        let mut b = bus.subscribe(&["interviewer_enduser"], "audit").await.unwrap();

        bus.publish("interviewer_enduser", question("hi")).await.unwrap();

        assert_eq!(a.try_recv().unwrap().message.content, "hi");
        assert_eq!(b.try_recv().unwrap().message.content, "hi");
        assert!(a.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_group_members_share_deliveries() {
        let bus = InMemoryBus::new();
        let mut first = bus.subscribe(&["t"], "workers").await.unwrap();
        let mut second = bus.subscribe(&["t"], "workers").await.unwrap();

        bus.publish("t", question("one")).await.unwrap();
        bus.publish("t", question("two")).await.unwrap();

        assert_eq!(first.try_recv().unwrap().message.content, "one");
        assert_eq!(second.try_recv().unwrap().message.content, "two");
        assert!(first.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_topic_filtering_and_history() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe(&["a"], "g").await.unwrap();

        bus.publish("b", question("elsewhere")).await.unwrap();
        bus.publish("a", question("here")).await.unwrap();

        let delivery = sub.try_recv().unwrap();
        assert_eq!(delivery.topic, "a");
        assert!(sub.try_recv().is_none());
        assert_eq!(bus.published("b").len(), 1);
        assert_eq!(bus.published_count(), 2);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let bus = InMemoryBus::with_history_limit(2);
        for text in ["one", "two", "three"] {
            bus.publish("t", question(text)).await.unwrap();
        }
        let kept: Vec<String> = bus.published("t").into_iter().map(|m| m.content).collect();
        assert_eq!(kept, vec!["two", "three"]);

        let silent = InMemoryBus::with_history_limit(0);
        let mut sub = silent.subscribe(&["t"], "g").await.unwrap();
        silent.publish("t", question("live")).await.unwrap();
        assert_eq!(sub.try_recv().unwrap().message.content, "live");
        assert_eq!(silent.published_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let bus = InMemoryBus::new();
        assert_eq!(
            bus.publish("", question("x")).await,
            Err(BusError::EmptyTopic)
        );
        assert!(bus.subscribe(&[""], "g").await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_consumer_is_skipped() {
        let bus = InMemoryBus::new();
        let dropped = bus.subscribe(&["t"], "g").await.unwrap();
        let mut live = bus.subscribe(&["t"], "g").await.unwrap();
        drop(dropped);

        bus.publish("t", question("after drop")).await.unwrap();
        assert_eq!(live.try_recv().unwrap().message.content, "after drop");
    }
}
