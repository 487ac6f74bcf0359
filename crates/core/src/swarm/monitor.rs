//! # Event Monitor
//!
//! First stop for every delivery an agent receives:
//!
//! 1. drop redeliveries (bounded FIFO of handled message IDs)
//! 2. drop messages the role does not care about
//! 3. direct roles trigger immediately
//! 4. join roles record the announced artifact under its conversation and
//!    trigger once every prerequisite type of that conversation is present,
//!    then drop the conversation's pending set
//!
//! A monitor is owned by exactly one listener task, so pending sets are
//! never updated concurrently.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use super::pipeline::{AgentRole, RoleSpec, TriggerRule};
use crate::bus::{ArtifactKind, ArtifactRef, Interest, Message, MessageKind};

/// Recently handled message IDs
#[derive(Debug, Clone)]
pub struct DedupWindow {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl DedupWindow {
    /// `None` remembers every ID
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Record `id`; false if it was already handled
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());
        if let Some(capacity) = self.capacity {
            while self.order.len() > capacity.max(1) {
                if let Some(evicted) = self.order.pop_front() {
                    self.seen.remove(&evicted);
                }
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Latest announced artifact per prerequisite type
#[derive(Debug, Clone, PartialEq)]
pub struct PendingArtifactSet {
    slots: BTreeMap<ArtifactKind, Option<ArtifactRef>>,
}

impl PendingArtifactSet {
    pub fn new(kinds: &[ArtifactKind]) -> Self {
        Self {
            slots: kinds.iter().map(|k| (*k, None)).collect(),
        }
    }

    /// Store the announcement, replacing an older one of the same type.
    /// Returns false for types outside the set.
    pub fn record(&mut self, artifact: ArtifactRef) -> bool {
        match self.slots.get_mut(&artifact.kind) {
            Some(slot) => {
                *slot = Some(artifact);
                true
            }
            None => false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slots.values().all(Option::is_some)
    }

    pub fn missing(&self) -> Vec<ArtifactKind> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.is_none())
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&ArtifactRef> {
        self.slots.get(&kind).and_then(Option::as_ref)
    }

    /// If complete, return every artifact and clear all slots
    pub fn take(&mut self) -> Option<Vec<ArtifactRef>> {
        if !self.is_ready() {
            return None;
        }
        let artifacts = self.slots.values_mut().filter_map(Option::take).collect();
        Some(artifacts)
    }
}

/// What the monitor did with one delivery
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    Duplicate,
    Irrelevant,
    /// Join recorded, prerequisites still missing
    Pending { missing: Vec<ArtifactKind> },
    /// Hand this message to the decision loop
    Triggered(Message),
}

#[derive(Debug, Clone)]
pub struct Monitor {
    role: AgentRole,
    interests: Vec<Interest>,
    dedup: DedupWindow,
    /// Prerequisite types, for join roles
    join: Option<Vec<ArtifactKind>>,
    pending: HashMap<String, PendingArtifactSet>,
}

impl Monitor {
    pub fn new(spec: &RoleSpec, dedup_window: Option<usize>) -> Self {
        let join = match &spec.trigger {
            TriggerRule::Direct => None,
            TriggerRule::Join(kinds) => Some(kinds.clone()),
        };
        Self {
            role: spec.role,
            interests: spec.interests.clone(),
            dedup: DedupWindow::new(dedup_window),
            join,
            pending: HashMap::new(),
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Partially joined prerequisites of one conversation
    pub fn pending(&self, conversation_id: &str) -> Option<&PendingArtifactSet> {
        self.pending.get(conversation_id)
    }

    pub fn observe(&mut self, message: Message) -> MonitorOutcome {
        if !message.id.is_empty() && !self.dedup.insert(&message.id) {
            tracing::debug!(role = %self.role, message_id = %message.id, "Duplicate delivery discarded");
            return MonitorOutcome::Duplicate;
        }

        if !self.interests.contains(&message.interest()) {
            tracing::debug!(role = %self.role, message_id = %message.id, "Irrelevant message discarded");
            return MonitorOutcome::Irrelevant;
        }

        let Some(kinds) = self.join.as_ref() else {
            tracing::info!(role = %self.role, message_id = %message.id, kind = ?message.kind, "Direct trigger");
            return MonitorOutcome::Triggered(message);
        };

        let Some(artifact) = message.announced().cloned() else {
            return MonitorOutcome::Irrelevant;
        };
        let kind = artifact.kind;
        let conversation_id = message.conversation_id.clone();
        let pending = self
            .pending
            .entry(conversation_id.clone())
            .or_insert_with(|| PendingArtifactSet::new(kinds));
        pending.record(artifact);
        let missing = pending.missing();

        match pending.take() {
            Some(artifacts) => {
                self.pending.remove(&conversation_id);
                tracing::info!(
                    role = %self.role,
                    artifacts = artifacts.len(),
                    "All prerequisites present, join triggered"
                );
                let content = artifacts
                    .iter()
                    .map(|a| format!("{}: {}", a.kind, a.key))
                    .collect::<Vec<_>>()
                    .join("\n");
                let trigger = Message::new(MessageKind::Trigger, conversation_id)
                    .from(self.role.as_str())
                    .to(self.role.as_str())
                    .with_content(content)
                    .with_artifacts(artifacts);
                MonitorOutcome::Triggered(trigger)
            }
            None => {
                tracing::info!(role = %self.role, recorded = %kind, ?missing, "Waiting for prerequisites");
                MonitorOutcome::Pending { missing }
            }
        }
    }
}
