//! # Decision Oracle
//!
//! The external service that picks one action from an allowed set and
//! writes free-text content for actions. Implementations:
//!
//! - [`LlmOracle`] - radkit structured outputs against the configured provider
//! - [`ScriptedOracle`] - deterministic closures and queues

pub mod llm;
pub mod llm_helpers;
pub mod parse;
pub mod scripted;

pub use llm::LlmOracle;
pub use parse::{extract_json, parse_decision};
pub use scripted::ScriptedOracle;

use crate::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One role-scoped decision request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Role making the decision
    pub role: String,
    /// Role description (system instructions)
    pub system_context: String,
    /// Trigger plus loop-local state, rendered as text
    pub request: String,
    pub allowed_actions: Vec<String>,
}

/// Unvalidated answer from the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDecision {
    pub action: String,
    #[serde(default)]
    pub rationale: String,
}

impl RawDecision {
    pub fn new(action: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            rationale: rationale.into(),
        }
    }
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Choose the next action. The answer is not yet checked against the allowed set.
    async fn decide(&self, request: &OracleRequest) -> Result<RawDecision, OracleError>;

    /// Produce content (a question, an answer, a document) for an action
    async fn generate(&self, system_context: &str, prompt: &str) -> Result<String, OracleError>;
}
