//! # Action Executor
//!
//! Each role owns a closed set of actions ([`ActionSet`]) and a registry
//! mapping every action to a handler. Handlers perform the side effects
//! (store writes, bus publishes) and report back with an [`ExecutionResult`]
//! whose status alone drives the decision loop.

use crate::bus::{ArtifactKind, Message, MessageBus};
use crate::config::Buckets;
use crate::error::{OracleError, StoreError};
use crate::oracle::DecisionOracle;
use crate::store::{self, ArtifactStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::events::SwarmEvent;
use super::pipeline::AgentRole;
use super::thinking::LoopState;

/// Loop control signal returned by every action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Terminal for this invocation; turn counters reset
    Complete,
    /// Fold `data` into the loop caches and decide again
    Continue,
    /// Stop and surface `reason`
    Error,
    /// Stop until the next external message; counters survive
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub action: String,
}

impl ExecutionResult {
    fn new(status: ExecutionStatus, action: &str) -> Self {
        Self {
            status,
            reason: None,
            data: None,
            action: action.to_string(),
        }
    }

    pub fn complete(action: &str) -> Self {
        Self::new(ExecutionStatus::Complete, action)
    }

    pub fn proceed(action: &str, data: Value) -> Self {
        Self::new(ExecutionStatus::Continue, action).with_data(data)
    }

    pub fn waiting(action: &str) -> Self {
        Self::new(ExecutionStatus::Waiting, action)
    }

    pub fn error(action: &str, reason: impl Into<String>) -> Self {
        let mut result = Self::new(ExecutionStatus::Error, action);
        result.reason = Some(reason.into());
        result
    }

    /// Result for an action name outside the role's registry
    pub fn unknown(action: &str) -> Self {
        Self::error(action, format!("unknown_action_{}", action))
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ExecutionStatus::Error
    }
}

/// A role's closed action space
pub trait ActionSet: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    fn all() -> &'static [Self];

    fn name(&self) -> &'static str;

    fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::all().iter().copied().find(|a| a.name() == name)
    }

    fn names() -> Vec<&'static str> {
        Self::all().iter().map(|a| a.name()).collect()
    }
}

/// Declare a role's action enum together with its [`ActionSet`] impl.
#[macro_export]
macro_rules! action_set {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::swarm::action::ActionSet for $name {
            fn all() -> &'static [Self] {
                &[$($name::$variant),+]
            }

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }
    };
}

/// How a decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Oracle,
    /// Oracle answer was invalid; the role's default was used
    Default,
    /// Deterministic routing from loop state, oracle bypassed
    Routed,
    /// Cap exceeded, terminal action forced
    Forced,
}

/// A validated decision. Built fresh every iteration, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision<A: ActionSet> {
    pub action: A,
    pub rationale: String,
    pub source: DecisionSource,
}

impl<A: ActionSet> Decision<A> {
    pub fn new(action: A, rationale: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            action,
            rationale: rationale.into(),
            source,
        }
    }
}

/// Shared collaborators handed to every action of one agent
#[derive(Clone)]
pub struct Services {
    pub role: AgentRole,
    pub store: Arc<dyn ArtifactStore>,
    pub bus: Arc<dyn MessageBus>,
    pub oracle: Arc<dyn DecisionOracle>,
    pub buckets: Buckets,
    pub events: Option<mpsc::Sender<SwarmEvent>>,
}

impl Services {
    pub fn new(
        role: AgentRole,
        store: Arc<dyn ArtifactStore>,
        bus: Arc<dyn MessageBus>,
        oracle: Arc<dyn DecisionOracle>,
    ) -> Self {
        Self {
            role,
            store,
            bus,
            oracle,
            buckets: Buckets::default(),
            events: None,
        }
    }

    pub fn with_buckets(mut self, buckets: Buckets) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<SwarmEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub async fn emit(&self, event: SwarmEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

/// What an action sees when it runs
pub struct ActionContext<'a> {
    pub services: &'a Services,
    pub trigger: &'a Message,
    pub rationale: &'a str,
    pub state: &'a LoopState,
}

impl ActionContext<'_> {
    pub fn conversation_id(&self) -> &str {
        &self.trigger.conversation_id
    }

    /// Ask the oracle for content on behalf of this action
    pub async fn generate(&self, system_context: &str, prompt: &str) -> Result<String, OracleError> {
        let text = self.services.oracle.generate(system_context, prompt).await?;
        Ok(text.trim().to_string())
    }

    /// Read an artifact referenced by the trigger message
    pub async fn read_artifact(&self, kind: ArtifactKind) -> Result<String, StoreError> {
        let artifact = self.trigger.artifact(kind).ok_or_else(|| {
            StoreError::InvalidLocation(format!("trigger carries no {} reference", kind))
        })?;
        store::read_text(self.services.store.as_ref(), &artifact.bucket, &artifact.key).await
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult;
}

pub struct ActionRegistry<A: ActionSet> {
    handlers: HashMap<A, Arc<dyn Action>>,
}

impl<A: ActionSet> Default for ActionRegistry<A> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<A: ActionSet> ActionRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, action: A, handler: impl Action + 'static) -> Self {
        self.handlers.insert(action, Arc::new(handler));
        self
    }

    /// Actions declared by the role but missing a handler
    pub fn missing(&self) -> Vec<A> {
        A::all()
            .iter()
            .copied()
            .filter(|a| !self.handlers.contains_key(a))
            .collect()
    }

    pub async fn execute(&self, decision: &Decision<A>, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = decision.action.name();
        match self.handlers.get(&decision.action) {
            Some(handler) => {
                tracing::info!(
                    role = %ctx.services.role,
                    action = name,
                    source = ?decision.source,
                    "Executing action"
                );
                handler.execute(ctx).await
            }
            None => ExecutionResult::unknown(name),
        }
    }
}
