//! # LLM Oracle
//!
//! Decision oracle backed by a radkit `LlmFunction`. Decisions and generated
//! content come back as structured outputs; the provider is chosen per role.

use super::{parse_decision, DecisionOracle, OracleRequest, RawDecision};
use crate::error::OracleError;
use crate::models::ModelConfig;
use crate::run_llm_function;
use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured decision returned by the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct DecisionOutput {
    /// Why this action is the right next step
    pub rationale: String,
    /// Exactly one of the allowed action names
    pub action: String,
}

/// Free-text content produced for an action
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct GeneratedText {
    /// The requested content, with no preamble
    pub content: String,
}

pub struct LlmOracle {
    config: ModelConfig,
}

impl LlmOracle {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    async fn run_decision(&self, system: String, prompt: String) -> anyhow::Result<DecisionOutput> {
        run_llm_function!(&self.config, DecisionOutput, system, prompt)
    }

    async fn run_generation(&self, system: String, prompt: String) -> anyhow::Result<GeneratedText> {
        run_llm_function!(&self.config, GeneratedText, system, prompt)
    }
}

const RAW_DECISION_FORMAT: &str =
    r#"Reply with a single JSON object: {"action": "<allowed action>", "rationale": "<one sentence>"}"#;

/// Render the decision request, including the closed action set
pub fn render_decision_prompt(request: &OracleRequest) -> String {
    format!(
        "{}\n\nALLOWED ACTIONS (choose exactly one): {}\n\nReturn the chosen action name and a short rationale.",
        request.request,
        request.allowed_actions.join(", ")
    )
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn decide(&self, request: &OracleRequest) -> Result<RawDecision, OracleError> {
        let prompt = render_decision_prompt(request);
        let decision = match self
            .run_decision(request.system_context.clone(), prompt.clone())
            .await
        {
            Ok(output) => RawDecision::new(output.action.trim(), output.rationale),
            Err(e) => {
                // Structured output rejected; ask again for plain text and salvage the JSON
                tracing::warn!(role = %request.role, error = %e, "Structured decision failed, retrying as text");
                let output = self
                    .run_generation(request.system_context.clone(), format!("{}\n\n{}", prompt, RAW_DECISION_FORMAT))
                    .await
                    .map_err(|e| OracleError::Transport(e.to_string()))?;
                parse_decision(&output.content)?
            }
        };

        tracing::debug!(
            role = %request.role,
            model = %self.config.model,
            action = %decision.action,
            "Oracle decision"
        );
        Ok(decision)
    }

    async fn generate(&self, system_context: &str, prompt: &str) -> Result<String, OracleError> {
        let output = self
            .run_generation(system_context.to_string(), prompt.to_string())
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if output.content.trim().is_empty() {
            return Err(OracleError::Malformed("empty generation".to_string()));
        }
        Ok(output.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_allowed_actions() {
        let request = OracleRequest {
            role: "enduser".to_string(),
            system_context: "You are an end user.".to_string(),
            request: "Question: what do you need?".to_string(),
            allowed_actions: vec!["respond".to_string(), "clarify".to_string()],
        };
        let prompt = render_decision_prompt(&request);
        assert!(prompt.starts_with("Question: what do you need?"));
        assert!(prompt.contains("respond, clarify"));
    }

    #[test]
    fn test_text_fallback_reply_is_salvaged_or_malformed() {
        let reply = "Sure.\n```json\n{\"action\": \"respond\", \"rationale\": \"direct question\"}\n```";
        assert_eq!(parse_decision(reply).unwrap().action, "respond");

        let err = parse_decision("I would respond to the interviewer.").unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }
}
