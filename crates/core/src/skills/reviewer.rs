//! Reviewer: quality review of the specification, producing the pipeline's
//! final artifact.

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
    pub enum ReviewerAction {
        ReviewSpecification => "review_specification",
    }
}

struct ReviewSpecification;

#[async_trait]
impl Action for ReviewSpecification {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = ReviewerAction::ReviewSpecification.name();
        let Ok(specification) = ctx
            .read_artifact(ArtifactKind::SoftwareRequirementsSpecification)
            .await
        else {
            return ExecutionResult::error(name, "storage_failure");
        };

        let prompt = format!(
            "Specification under review:\n{}\n\n\
             Check every requirement for ambiguity, verifiability, consistency and \
             traceability. Return the revised specification followed by a review log \
             listing each change and the reason for it.",
            specification
        );
        let document = match ctx.generate(prompts::REVIEWER, &prompt).await {
            Ok(doc) if !doc.is_empty() => doc,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        match store_and_announce(ctx, ArtifactKind::ReviewedSpecification, &document, &[specification.as_str()]).await {
            Ok(artifact) => {
                ExecutionResult::complete(name).with_data(json!({ "artifact_key": artifact.key }))
            }
            Err(failure) => failure.into_result(name),
        }
    }
}

pub struct ReviewerBehavior;

impl RoleBehavior<ReviewerAction> for ReviewerBehavior {
    fn system_context(&self) -> &str {
        prompts::REVIEWER
    }

    fn build_request(&self, trigger: &Message, _state: &LoopState) -> String {
        let key = trigger
            .announced()
            .map(|a| a.key.as_str())
            .unwrap_or("(unknown)");
        format!("A specification is ready for review: {}", key)
    }

    fn default_decision(&self) -> Option<ReviewerAction> {
        Some(ReviewerAction::ReviewSpecification)
    }
}

pub fn registry() -> ActionRegistry<ReviewerAction> {
    ActionRegistry::new().register(ReviewerAction::ReviewSpecification, ReviewSpecification)
}

pub fn decision_loop(services: Services, config: &PipelineConfig) -> DecisionLoop<ReviewerAction> {
    DecisionLoop::new(ReviewerBehavior, registry(), services, config.max_iterations)
}

pub fn agent(spec: RoleSpec, services: Services, config: &PipelineConfig) -> Agent<ReviewerAction> {
    Agent::new(spec, config.dedup_window, decision_loop(services, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ArtifactRef, InMemoryBus, ARTIFACT_EVENTS};
    use crate::oracle::ScriptedOracle;
    use crate::store::{ArtifactStore, InMemoryStore};
    use crate::swarm::pipeline::AgentRole;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_review_publishes_final_artifact() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let srs = ArtifactRef::new(
            ArtifactKind::SoftwareRequirementsSpecification,
            "requirements-artifacts",
            "c/srs.md",
        );
        store.put(&srs.bucket, &srs.key, b"# SRS".to_vec()).await.unwrap();
        let oracle = ScriptedOracle::new().with_generator(|_, _| Ok("# SRS (reviewed)".to_string()));
        let services = Services::new(AgentRole::Reviewer, store, bus.clone(), Arc::new(oracle));
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let outcome = lp.decide(&Message::announcement("artifact-srs", "c", srs)).await;
        assert_eq!(outcome.action(), Some("review_specification"));
        assert!(outcome.is_completed());

        let announced = bus.published(ARTIFACT_EVENTS);
        assert_eq!(
            announced[0].announced().map(|a| a.kind),
            Some(ArtifactKind::ReviewedSpecification)
        );
    }
}
