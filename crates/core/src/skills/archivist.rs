//! Archivist: assembles the software requirements specification once both
//! analyst artifacts are in.

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

action_set! {
    pub enum ArchivistAction {
        GenerateSpecification => "generate_software_requirements_specification",
    }
}

struct GenerateSpecification;

#[async_trait]
impl Action for GenerateSpecification {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = ArchivistAction::GenerateSpecification.name();
        let (Ok(system), Ok(model)) = (
            ctx.read_artifact(ArtifactKind::SystemRequirementsList).await,
            ctx.read_artifact(ArtifactKind::RequirementsModel).await,
        ) else {
            return ExecutionResult::error(name, "storage_failure");
        };

        let prompt = format!(
            "System requirements:\n{}\n\nRequirement model:\n{}\n\n\
             Assemble the software requirements specification following ISO/IEC/IEEE 29148: \
             introduction, overall description, specific requirements, verification, and \
             the requirement model as an appendix.",
            system, model
        );
        let document = match ctx.generate(prompts::ARCHIVIST, &prompt).await {
            Ok(doc) if !doc.is_empty() => doc,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        let sources = [system.as_str(), model.as_str()];
        match store_and_announce(ctx, ArtifactKind::SoftwareRequirementsSpecification, &document, &sources).await {
            Ok(artifact) => {
                ExecutionResult::complete(name).with_data(json!({ "artifact_key": artifact.key }))
            }
            Err(failure) => failure.into_result(name),
        }
    }
}

pub struct ArchivistBehavior;

impl RoleBehavior<ArchivistAction> for ArchivistBehavior {
    fn system_context(&self) -> &str {
        prompts::ARCHIVIST
    }

    fn build_request(&self, trigger: &Message, _state: &LoopState) -> String {
        format!(
            "Inputs ready:\n{}\n\nProduce the software requirements specification.",
            trigger.content
        )
    }

    fn default_decision(&self) -> Option<ArchivistAction> {
        Some(ArchivistAction::GenerateSpecification)
    }
}

pub fn registry() -> ActionRegistry<ArchivistAction> {
    ActionRegistry::new().register(ArchivistAction::GenerateSpecification, GenerateSpecification)
}

pub fn decision_loop(services: Services, config: &PipelineConfig) -> DecisionLoop<ArchivistAction> {
    DecisionLoop::new(ArchivistBehavior, registry(), services, config.max_iterations)
}

pub fn agent(spec: RoleSpec, services: Services, config: &PipelineConfig) -> Agent<ArchivistAction> {
    Agent::new(spec, config.dedup_window, decision_loop(services, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ArtifactRef, InMemoryBus, MessageKind, ARTIFACT_EVENTS};
    use crate::oracle::ScriptedOracle;
    use crate::store::{self, ArtifactStore, InMemoryStore};
    use crate::swarm::pipeline::AgentRole;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_specification_from_both_inputs() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let system = ArtifactRef::new(ArtifactKind::SystemRequirementsList, "requirements-artifacts", "c/s.md");
        let model = ArtifactRef::new(ArtifactKind::RequirementsModel, "requirements-artifacts", "c/m.md");
        store.put(&system.bucket, &system.key, b"SR-1".to_vec()).await.unwrap();
        store.put(&model.bucket, &model.key, b"@startuml".to_vec()).await.unwrap();

        let oracle = ScriptedOracle::new().with_generator(|_, prompt| {
            assert!(prompt.contains("SR-1") && prompt.contains("@startuml"));
            Ok("# SRS\n1. Introduction".to_string())
        });
        let services = Services::new(AgentRole::Archivist, store.clone(), bus.clone(), Arc::new(oracle));
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let trigger = Message::new(MessageKind::Trigger, "c").with_artifacts(vec![system, model]);
        assert!(lp.decide(&trigger).await.is_completed());

        let announced = bus.published(ARTIFACT_EVENTS);
        let srs = announced[0].announced().unwrap();
        assert_eq!(srs.kind, ArtifactKind::SoftwareRequirementsSpecification);
        assert_eq!(
            store::read_text(store.as_ref(), &srs.bucket, &srs.key).await.unwrap(),
            "# SRS\n1. Introduction"
        );
    }

    #[tokio::test]
    async fn test_missing_input_is_storage_failure() {
        let services = Services::new(
            AgentRole::Archivist,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryBus::new()),
            Arc::new(ScriptedOracle::new()),
        );
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let outcome = lp.decide(&Message::new(MessageKind::Trigger, "c")).await;
        assert!(matches!(
            outcome,
            crate::swarm::thinking::LoopOutcome::Failed { ref reason, .. } if reason == "storage_failure"
        ));
    }
}
