//! # Decision Loop
//!
//! Think → Act → Check → Repeat for one agent. Each invocation of
//! [`DecisionLoop::decide`] runs until an action returns a terminal status,
//! the oracle fails, or a cap forces the role's terminal action.
//!
//! ```text
//! DECIDING ──decision──▶ ACTING ──continue──▶ DECIDING
//!                          │
//!                          └─complete/error/waiting──▶ TERMINAL
//! ```
//!
//! Two caps bound execution:
//! - the **turn cap** counts dialogue turns per conversation and survives
//!   `waiting`, so it spans invocations;
//! - the **iteration cap** counts decide/act cycles inside one invocation.

use serde_json::Value;
use std::collections::HashMap;

use super::action::{
    ActionContext, ActionRegistry, ActionSet, Decision, DecisionSource, ExecutionResult,
    ExecutionStatus, Services,
};
use super::pipeline::AgentRole;
use crate::bus::Message;
use crate::error::OracleError;
use crate::oracle::{OracleRequest, RawDecision};

/// Loop-local state for one invocation
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    /// Dialogue turn, starting at 1
    pub turns: u32,
    pub iterations: u32,
    /// `data` of every `continue` result, by action name
    pub cache: HashMap<String, Value>,
}

impl LoopState {
    pub fn cached(&self, action: &str) -> Option<&Value> {
        self.cache.get(action)
    }

    pub fn cached_f64(&self, action: &str, field: &str) -> Option<f64> {
        self.cached(action)?.get(field)?.as_f64()
    }

    pub fn cached_str(&self, action: &str, field: &str) -> Option<&str> {
        self.cached(action)?.get(field)?.as_str()
    }

    pub fn cached_bool(&self, action: &str, field: &str) -> Option<bool> {
        self.cached(action)?.get(field)?.as_bool()
    }
}

/// Per-role policy plugged into the generic loop
pub trait RoleBehavior<A: ActionSet>: Send + Sync {
    /// Role description handed to the oracle
    fn system_context(&self) -> &str;

    /// Render the decision request from the trigger and loop state
    fn build_request(&self, trigger: &Message, state: &LoopState) -> String;

    /// Replacement for an invalid oracle answer
    fn default_decision(&self) -> Option<A> {
        None
    }

    /// Deterministic choice that bypasses the oracle
    fn route(&self, _trigger: &Message, _state: &LoopState) -> Option<A> {
        None
    }

    /// The action that counts as one dialogue turn
    fn turn_action(&self) -> Option<A> {
        None
    }

    fn turn_cap(&self) -> Option<u32> {
        None
    }

    /// Terminal action run when a cap is exceeded
    fn forced_action(&self) -> Option<A> {
        None
    }

    /// Fold a `continue` result into the caches
    fn absorb(&self, result: &ExecutionResult, state: &mut LoopState) {
        if let Some(data) = &result.data {
            state.cache.insert(result.action.clone(), data.clone());
        }
    }
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    Completed {
        action: String,
        iterations: u32,
        forced: bool,
    },
    Waiting {
        action: String,
        iterations: u32,
    },
    /// An action (or an invalid decision) reported an error
    Failed {
        action: String,
        reason: String,
    },
    /// The oracle failed before any action ran
    Aborted {
        reason: String,
    },
}

impl LoopOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, LoopOutcome::Completed { .. })
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            LoopOutcome::Completed { action, .. }
            | LoopOutcome::Waiting { action, .. }
            | LoopOutcome::Failed { action, .. } => Some(action),
            LoopOutcome::Aborted { .. } => None,
        }
    }
}

pub struct DecisionLoop<A: ActionSet> {
    behavior: Box<dyn RoleBehavior<A>>,
    registry: ActionRegistry<A>,
    services: Services,
    max_iterations: u32,
    /// Dialogue turn per conversation
    turns: HashMap<String, u32>,
}

impl<A: ActionSet> DecisionLoop<A> {
    pub fn new(
        behavior: impl RoleBehavior<A> + 'static,
        registry: ActionRegistry<A>,
        services: Services,
        max_iterations: u32,
    ) -> Self {
        let missing = registry.missing();
        if !missing.is_empty() {
            tracing::warn!(role = %services.role, ?missing, "Actions without a handler will fail as unknown");
        }
        Self {
            behavior: Box::new(behavior),
            registry,
            services,
            max_iterations,
            turns: HashMap::new(),
        }
    }

    pub fn role(&self) -> AgentRole {
        self.services.role
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Action substituted for invalid decisions
    pub fn default_action(&self) -> Option<A> {
        self.behavior.default_decision()
    }

    pub fn turn_cap(&self) -> Option<u32> {
        self.behavior.turn_cap()
    }

    /// Conversations with a dialogue in progress
    pub fn open_conversations(&self) -> usize {
        self.turns.len()
    }

    /// Current dialogue turn for a conversation
    pub fn turn(&self, conversation_id: &str) -> u32 {
        self.turns.get(conversation_id).copied().unwrap_or(1)
    }

    pub async fn decide(&mut self, trigger: &Message) -> LoopOutcome {
        let role = self.services.role;
        let conversation_id = trigger.conversation_id.clone();
        let mut state = LoopState {
            turns: self.turn(&conversation_id),
            ..LoopState::default()
        };

        loop {
            state.iterations += 1;

            if let Some(cap) = self.behavior.turn_cap() {
                if state.turns > cap {
                    tracing::warn!(%role, turns = state.turns, cap, "Turn cap reached, forcing terminal action");
                    return self.force(trigger, &state, "turn_cap_reached").await;
                }
            }
            if state.iterations > self.max_iterations {
                tracing::warn!(%role, iterations = state.iterations, "Iteration cap reached");
                return self.force(trigger, &state, "max_iterations_reached").await;
            }

            let decision = match self.behavior.route(trigger, &state) {
                Some(action) => Decision::new(action, "routed from loop state", DecisionSource::Routed),
                None => {
                    let request = OracleRequest {
                        role: role.to_string(),
                        system_context: self.behavior.system_context().to_string(),
                        request: self.behavior.build_request(trigger, &state),
                        allowed_actions: A::names().into_iter().map(String::from).collect(),
                    };
                    let raw = match self.services.oracle.decide(&request).await {
                        Ok(raw) => raw,
                        // Unreadable answers are treated as invalid decisions
                        Err(OracleError::Malformed(detail)) => {
                            tracing::warn!(%role, %detail, "Malformed oracle decision");
                            RawDecision::new("", detail)
                        }
                        Err(e) => {
                            tracing::warn!(%role, error = %e, "Oracle failed, aborting loop");
                            return LoopOutcome::Aborted {
                                reason: format!("oracle_failure: {}", e),
                            };
                        }
                    };
                    match self.validate(raw) {
                        Ok(decision) => decision,
                        Err(result) => {
                            tracing::warn!(%role, action = %result.action, "Invalid decision, no default");
                            return LoopOutcome::Failed {
                                action: result.action,
                                reason: result.reason.unwrap_or_default(),
                            };
                        }
                    }
                }
            };

            tracing::debug!(
                %role,
                action = decision.action.name(),
                rationale = %decision.rationale,
                "Decision made"
            );

            let result = {
                let ctx = ActionContext {
                    services: &self.services,
                    trigger,
                    rationale: &decision.rationale,
                    state: &state,
                };
                self.registry.execute(&decision, &ctx).await
            };

            tracing::info!(
                %role,
                action = %result.action,
                status = ?result.status,
                reason = result.reason.as_deref().unwrap_or(""),
                "Action finished"
            );

            if !result.is_error() && Some(decision.action) == self.behavior.turn_action() {
                state.turns += 1;
            }

            match result.status {
                ExecutionStatus::Complete => {
                    self.turns.remove(&conversation_id);
                    return LoopOutcome::Completed {
                        action: result.action,
                        iterations: state.iterations,
                        forced: false,
                    };
                }
                ExecutionStatus::Waiting => {
                    self.turns.insert(conversation_id, state.turns);
                    return LoopOutcome::Waiting {
                        action: result.action,
                        iterations: state.iterations,
                    };
                }
                ExecutionStatus::Error => {
                    // A failed dialogue is not resumed
                    self.turns.remove(&conversation_id);
                    return LoopOutcome::Failed {
                        action: result.action,
                        reason: result.reason.unwrap_or_default(),
                    };
                }
                ExecutionStatus::Continue => self.behavior.absorb(&result, &mut state),
            }
        }
    }

    /// Check the oracle's answer against the closed action set
    fn validate(&self, raw: RawDecision) -> Result<Decision<A>, ExecutionResult> {
        if let Some(action) = A::parse(&raw.action) {
            return Ok(Decision::new(action, raw.rationale, DecisionSource::Oracle));
        }
        match self.behavior.default_decision() {
            Some(action) => {
                tracing::warn!(
                    role = %self.services.role,
                    invalid = %raw.action,
                    fallback = action.name(),
                    "Oracle chose an action outside the allowed set, using default"
                );
                Ok(Decision::new(action, raw.rationale, DecisionSource::Default))
            }
            None => {
                let name = if raw.action.is_empty() { "none" } else { raw.action.as_str() };
                Err(ExecutionResult::unknown(name))
            }
        }
    }

    async fn force(&mut self, trigger: &Message, state: &LoopState, reason: &str) -> LoopOutcome {
        self.turns.remove(&trigger.conversation_id);
        let Some(action) = self.behavior.forced_action() else {
            return LoopOutcome::Failed {
                action: "none".to_string(),
                reason: reason.to_string(),
            };
        };

        let decision = Decision::new(action, reason, DecisionSource::Forced);
        let ctx = ActionContext {
            services: &self.services,
            trigger,
            rationale: reason,
            state,
        };
        let result = self.registry.execute(&decision, &ctx).await;
        match result.status {
            ExecutionStatus::Error => LoopOutcome::Failed {
                action: result.action,
                reason: result.reason.unwrap_or_default(),
            },
            _ => LoopOutcome::Completed {
                action: result.action,
                iterations: state.iterations,
                forced: true,
            },
        }
    }
}
