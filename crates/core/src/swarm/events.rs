//! # Swarm Events
//!
//! Typed telemetry emitted by agents and the coordinator, for callers that
//! want more than log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of swarm event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwarmEventKind {
    /// Human input published
    PipelineStarted,
    /// Monitor handed a message to the decision loop
    AgentTriggered,
    /// Join recorded an artifact, still waiting
    JoinPending,
    /// Decision loop reached a terminal status
    LoopFinished,
    /// Decision loop stopped on an error or oracle failure
    LoopFailed,
    /// Artifact announced on `artifact_events`
    ArtifactPublished,
    /// Reviewed document produced
    PipelineCompleted,
    /// Run gave up (timeout or bus closed)
    PipelineFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SwarmEventKind,
    /// Agent role that produced this event
    pub agent: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl SwarmEvent {
    pub fn new(kind: SwarmEventKind, agent: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            agent: agent.to_string(),
            data: None,
            conversation_id: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = SwarmEvent::new(SwarmEventKind::AgentTriggered, "analyst")
            .with_conversation("conv-1")
            .with_data(serde_json::json!({"message_id": "m1"}));

        assert_eq!(event.agent, "analyst");
        assert_eq!(event.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(
            serde_json::to_value(&event.kind).unwrap(),
            "agent_triggered"
        );
    }
}
