//! # Agent
//!
//! One monitor, one decision loop, one subscription. The listener task pulls
//! a delivery, runs it through the monitor and, when triggered, runs the
//! full loop before pulling the next delivery.

use serde_json::json;
use tokio::task::JoinHandle;

use super::action::{ActionSet, Services};
use super::events::{SwarmEvent, SwarmEventKind};
use super::monitor::{Monitor, MonitorOutcome};
use super::pipeline::{AgentRole, RoleSpec};
use super::thinking::{DecisionLoop, LoopOutcome};
use crate::bus::{Message, Subscription};
use crate::error::BusError;

pub struct Agent<A: ActionSet> {
    spec: RoleSpec,
    monitor: Monitor,
    thinking: DecisionLoop<A>,
}

impl<A: ActionSet> Agent<A> {
    pub fn new(spec: RoleSpec, dedup_window: Option<usize>, thinking: DecisionLoop<A>) -> Self {
        let monitor = Monitor::new(&spec, dedup_window);
        let agent = Self {
            spec,
            monitor,
            thinking,
        };
        if let Some(mismatch) = agent.policy_mismatch() {
            tracing::warn!(role = %agent.spec.role, %mismatch, "Topology row disagrees with role behavior");
        }
        agent
    }

    /// Compare the topology row with what the decision loop actually applies
    pub fn policy_mismatch(&self) -> Option<String> {
        let actions = A::names();
        if self.spec.allowed_actions != actions {
            return Some(format!(
                "actions {:?} vs {:?}",
                self.spec.allowed_actions, actions
            ));
        }
        let default = self.thinking.default_action().map(|a| a.name());
        if self.spec.default_action != default {
            return Some(format!(
                "default {:?} vs {:?}",
                self.spec.default_action, default
            ));
        }
        if self.spec.turn_cap != self.thinking.turn_cap() {
            return Some(format!(
                "turn cap {:?} vs {:?}",
                self.spec.turn_cap,
                self.thinking.turn_cap()
            ));
        }
        None
    }

    pub fn role(&self) -> AgentRole {
        self.spec.role
    }

    pub fn spec(&self) -> &RoleSpec {
        &self.spec
    }

    pub fn thinking(&self) -> &DecisionLoop<A> {
        &self.thinking
    }

    fn services(&self) -> &Services {
        self.thinking.services()
    }

    /// Process one delivery. `None` when the monitor did not trigger.
    pub async fn handle(&mut self, message: Message) -> Option<LoopOutcome> {
        let conversation_id = message.conversation_id.clone();
        let trigger = match self.monitor.observe(message) {
            MonitorOutcome::Triggered(trigger) => trigger,
            MonitorOutcome::Pending { missing } => {
                let missing: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
                self.services()
                    .emit(
                        SwarmEvent::new(SwarmEventKind::JoinPending, self.spec.role.as_str())
                            .with_conversation(&conversation_id)
                            .with_data(json!({ "missing": missing })),
                    )
                    .await;
                return None;
            }
            MonitorOutcome::Duplicate | MonitorOutcome::Irrelevant => return None,
        };

        self.services()
            .emit(
                SwarmEvent::new(SwarmEventKind::AgentTriggered, self.spec.role.as_str())
                    .with_conversation(&conversation_id)
                    .with_data(json!({ "message_id": trigger.id, "kind": trigger.kind })),
            )
            .await;

        let outcome = self.thinking.decide(&trigger).await;

        let kind = match &outcome {
            LoopOutcome::Completed { .. } | LoopOutcome::Waiting { .. } => SwarmEventKind::LoopFinished,
            LoopOutcome::Failed { .. } | LoopOutcome::Aborted { .. } => SwarmEventKind::LoopFailed,
        };
        if kind == SwarmEventKind::LoopFailed {
            tracing::warn!(role = %self.spec.role, ?outcome, "Decision loop stopped without completing");
        }
        self.services()
            .emit(
                SwarmEvent::new(kind, self.spec.role.as_str())
                    .with_conversation(&conversation_id)
                    .with_data(json!({ "outcome": format!("{:?}", outcome) })),
            )
            .await;

        Some(outcome)
    }

    /// Listen until the bus drops the subscription. Failures stay inside
    /// `handle`; the listener itself never stops on them.
    pub async fn run(mut self, mut subscription: Subscription) {
        tracing::info!(role = %self.spec.role, topics = ?self.spec.topics, "Agent listening");
        while let Some(delivery) = subscription.recv().await {
            tracing::debug!(
                role = %self.spec.role,
                topic = %delivery.topic,
                message_id = %delivery.message.id,
                "Delivery received"
            );
            self.handle(delivery.message).await;
        }
        tracing::info!(role = %self.spec.role, "Subscription closed, agent stopping");
    }
}

/// A running agent task
pub struct AgentHandle {
    pub role: AgentRole,
    join: JoinHandle<()>,
}

impl AgentHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Subscribe the agent's topics (group = role name) and start its listener.
/// The subscription exists before this returns, so nothing published
/// afterwards is missed.
pub async fn spawn<A: ActionSet>(agent: Agent<A>) -> Result<AgentHandle, BusError> {
    let role = agent.role();
    let subscription = agent
        .services()
        .bus
        .subscribe(&agent.spec.topics, role.as_str())
        .await?;
    let join = tokio::spawn(agent.run(subscription));
    Ok(AgentHandle { role, join })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBus, MessageBus, MessageKind};
    use crate::config::PipelineConfig;
    use crate::error::OracleError;
    use crate::oracle::ScriptedOracle;
    use crate::skills::enduser;
    use crate::store::InMemoryStore;
    use crate::swarm::pipeline::{PipelineTopology, ENDUSER_INTERVIEWER, INTERVIEWER_ENDUSER};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn question(conversation_id: &str, text: &str) -> Message {
        Message::new(MessageKind::Question, conversation_id)
            .from("interviewer")
            .to("enduser")
            .with_content(text)
    }

    #[tokio::test]
    async fn test_listener_survives_failed_delivery() {
        let config = PipelineConfig::default();
        let bus = Arc::new(InMemoryBus::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let oracle = ScriptedOracle::new().with_generator(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(OracleError::Transport("connection reset".to_string()))
            } else {
                Ok("Evenings and weekends.".to_string())
            }
        });
        let services = Services::new(
            AgentRole::EndUser,
            Arc::new(InMemoryStore::new()),
            bus.clone(),
            Arc::new(oracle),
        );
        let spec = PipelineTopology::reference(&config)
            .role(AgentRole::EndUser)
            .unwrap()
            .clone();
        let handle = spawn(enduser::agent(spec, services, &config)).await.unwrap();

        bus.publish(INTERVIEWER_ENDUSER, question("conv-1", "When do you play?"))
            .await
            .unwrap();
        bus.publish(INTERVIEWER_ENDUSER, question("conv-1", "How often?"))
            .await
            .unwrap();

        for _ in 0..200 {
            if !bus.published(ENDUSER_INTERVIEWER).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let replies = bus.published(ENDUSER_INTERVIEWER);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].content, "Evenings and weekends.");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!handle.is_finished());
        handle.abort();
    }
}
