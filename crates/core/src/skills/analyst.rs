//! # Analyst Skill
//!
//! Joins the two interview results. First derives the system requirements
//! list, then picks a modelling notation and writes the requirement model.

use async_trait::async_trait;
use serde_json::json;

use super::artifact_registry::store_and_announce;
use super::prompts;
use crate::action_set;
use crate::bus::{ArtifactKind, Message};
use crate::config::PipelineConfig;
use crate::swarm::action::{Action, ActionContext, ActionRegistry, ActionSet, ExecutionResult, Services};
use crate::swarm::agent::Agent;
use crate::swarm::pipeline::RoleSpec;
use crate::swarm::thinking::{DecisionLoop, LoopState, RoleBehavior};

pub const USE_CASE_DIAGRAM: &str = "Use case diagram";
pub const SYSML_DIAGRAM: &str = "SysML-v2 diagram";

action_set! {
    pub enum AnalystAction {
        GenerateSystemRequirements => "generate_system_requirements",
        ChooseRequirementModel => "choose_requirement_model",
        GenerateRequirementModel => "generate_requirement_model",
    }
}

/// Both joined inputs, user requirements first
async fn inputs(ctx: &ActionContext<'_>) -> Option<(String, String)> {
    let user = ctx.read_artifact(ArtifactKind::UserRequirementsList).await.ok()?;
    let environment = ctx
        .read_artifact(ArtifactKind::OperatingEnvironmentList)
        .await
        .ok()?;
    Some((user, environment))
}

struct GenerateSystemRequirements;

#[async_trait]
impl Action for GenerateSystemRequirements {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = AnalystAction::GenerateSystemRequirements.name();
        let Some((user, environment)) = inputs(ctx).await else {
            return ExecutionResult::error(name, "storage_failure");
        };

        let prompt = format!(
            "User requirements:\n{}\n\nOperating environment:\n{}\n\n\
             Derive the system requirements list. Number each requirement, state it as a \
             verifiable 'The system shall' sentence and trace it to its source items.",
            user, environment
        );
        let document = match ctx.generate(prompts::ANALYST, &prompt).await {
            Ok(doc) if !doc.is_empty() => doc,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        let sources = [user.as_str(), environment.as_str()];
        match store_and_announce(ctx, ArtifactKind::SystemRequirementsList, &document, &sources).await {
            Ok(artifact) => ExecutionResult::proceed(
                name,
                json!({ "content": document, "artifact_key": artifact.key }),
            ),
            Err(failure) => failure.into_result(name),
        }
    }
}

struct ChooseRequirementModel;

#[async_trait]
impl Action for ChooseRequirementModel {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = AnalystAction::ChooseRequirementModel.name();
        let Some(system) = ctx.state.cached_str("generate_system_requirements", "content") else {
            return ExecutionResult::error(name, "missing_system_requirements");
        };

        let prompt = format!(
            "System requirements:\n{}\n\n\
             Which notation models these requirements best? Answer with exactly one of: \
             \"{}\" or \"{}\".",
            system, USE_CASE_DIAGRAM, SYSML_DIAGRAM
        );
        let answer = match ctx.generate(prompts::ANALYST, &prompt).await {
            Ok(answer) => answer,
            Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };
        let model = if answer.to_lowercase().contains("sysml") {
            SYSML_DIAGRAM
        } else {
            USE_CASE_DIAGRAM
        };

        tracing::info!(model, "Requirement model chosen");
        ExecutionResult::proceed(name, json!({ "model": model }))
    }
}

struct GenerateRequirementModel;

#[async_trait]
impl Action for GenerateRequirementModel {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = AnalystAction::GenerateRequirementModel.name();
        let Some(system) = ctx.state.cached_str("generate_system_requirements", "content") else {
            return ExecutionResult::error(name, "missing_system_requirements");
        };
        let model = ctx
            .state
            .cached_str("choose_requirement_model", "model")
            .unwrap_or(USE_CASE_DIAGRAM);

        let prompt = format!(
            "System requirements:\n{}\n\n\
             Write a {} covering every requirement above, as PlantUML or SysML v2 textual \
             notation, followed by a short legend.",
            system, model
        );
        let document = match ctx.generate(prompts::ANALYST, &prompt).await {
            Ok(doc) if !doc.is_empty() => doc,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        match store_and_announce(ctx, ArtifactKind::RequirementsModel, &document, &[system, model]).await {
            Ok(artifact) => {
                ExecutionResult::complete(name).with_data(json!({ "artifact_key": artifact.key, "model": model }))
            }
            Err(failure) => failure.into_result(name),
        }
    }
}

pub struct AnalystBehavior;

impl RoleBehavior<AnalystAction> for AnalystBehavior {
    fn system_context(&self) -> &str {
        prompts::ANALYST
    }

    fn build_request(&self, trigger: &Message, state: &LoopState) -> String {
        let system = if state.cached("generate_system_requirements").is_some() {
            "GENERATED"
        } else {
            "NOT GENERATED"
        };
        let model = state
            .cached_str("choose_requirement_model", "model")
            .map(|m| format!("CHOSEN ({})", m))
            .unwrap_or_else(|| "NOT CHOSEN".to_string());

        format!(
            "=== INPUTS ===\n{}\n\n\
             === STATUS ===\n\
             System requirements: {}\n\
             Requirement model: {}\n\n\
             Generate the system requirements first, then choose a requirement model, \
             then generate it.",
            trigger.content, system, model
        )
    }

    fn route(&self, _trigger: &Message, state: &LoopState) -> Option<AnalystAction> {
        state
            .cached("choose_requirement_model")
            .map(|_| AnalystAction::GenerateRequirementModel)
    }
}

pub fn registry() -> ActionRegistry<AnalystAction> {
    ActionRegistry::new()
        .register(AnalystAction::GenerateSystemRequirements, GenerateSystemRequirements)
        .register(AnalystAction::ChooseRequirementModel, ChooseRequirementModel)
        .register(AnalystAction::GenerateRequirementModel, GenerateRequirementModel)
}

pub fn decision_loop(services: Services, config: &PipelineConfig) -> DecisionLoop<AnalystAction> {
    DecisionLoop::new(AnalystBehavior, registry(), services, config.max_iterations)
}

pub fn agent(spec: RoleSpec, services: Services, config: &PipelineConfig) -> Agent<AnalystAction> {
    Agent::new(spec, config.dedup_window, decision_loop(services, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ArtifactRef, InMemoryBus, MessageKind, ARTIFACT_EVENTS};
    use crate::oracle::ScriptedOracle;
    use crate::store::{ArtifactStore, InMemoryStore};
    use crate::swarm::pipeline::AgentRole;
    use crate::swarm::thinking::LoopOutcome;
    use std::sync::Arc;

    async fn joined_trigger(store: &InMemoryStore) -> Message {
        let user = ArtifactRef::new(ArtifactKind::UserRequirementsList, "requirements-artifacts", "conv-1/u.md");
        let env = ArtifactRef::new(ArtifactKind::OperatingEnvironmentList, "requirements-artifacts", "conv-1/o.md");
        store.put(&user.bucket, &user.key, b"1. Book halls".to_vec()).await.unwrap();
        store.put(&env.bucket, &env.key, b"Two VMs".to_vec()).await.unwrap();
        Message::new(MessageKind::Trigger, "conv-1").with_artifacts(vec![user, env])
    }

    #[tokio::test]
    async fn test_two_stage_generation() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let oracle = ScriptedOracle::from_actions(["generate_system_requirements", "choose_requirement_model"])
            .with_generator(|_, prompt| {
                Ok(if prompt.contains("Which notation") {
                    "SysML-v2 diagram".to_string()
                } else {
                    "SR-1 The system shall accept bookings".to_string()
                })
            });
        let services = Services::new(AgentRole::Analyst, store.clone(), bus.clone(), Arc::new(oracle));
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let outcome = lp.decide(&joined_trigger(&store).await).await;
        assert!(matches!(
            outcome,
            LoopOutcome::Completed { ref action, iterations: 3, .. } if action == "generate_requirement_model"
        ));

        let kinds: Vec<_> = bus
            .published(ARTIFACT_EVENTS)
            .iter()
            .filter_map(|m| m.announced().map(|a| a.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![ArtifactKind::SystemRequirementsList, ArtifactKind::RequirementsModel]
        );
    }

    #[tokio::test]
    async fn test_model_before_requirements_is_error() {
        let services = Services::new(
            AgentRole::Analyst,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryBus::new()),
            Arc::new(ScriptedOracle::from_actions(["choose_requirement_model"])),
        );
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let outcome = lp.decide(&Message::new(MessageKind::Trigger, "conv-1")).await;
        assert_eq!(
            outcome,
            LoopOutcome::Failed {
                action: "choose_requirement_model".to_string(),
                reason: "missing_system_requirements".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_action_has_no_default() {
        let bus = Arc::new(InMemoryBus::new());
        let services = Services::new(
            AgentRole::Analyst,
            Arc::new(InMemoryStore::new()),
            bus.clone(),
            Arc::new(ScriptedOracle::from_actions(["write_code"])),
        );
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let outcome = lp.decide(&Message::new(MessageKind::Trigger, "conv-1")).await;
        assert!(matches!(outcome, LoopOutcome::Failed { ref reason, .. } if reason == "unknown_action_write_code"));
        assert_eq!(bus.published_count(), 0);
    }
}
