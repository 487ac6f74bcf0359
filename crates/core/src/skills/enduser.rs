//! End user: the simulated stakeholder answering the interviewer.

use async_trait::async_trait;
use serde_json::json;

use super::prompts;
use crate::action_set;
use crate::bus::{Message, MessageKind};
use crate::config::PipelineConfig;
use crate::state::record::{self, Channel, Speaker};
use crate::swarm::action::{Action, ActionContext, ActionRegistry, ActionSet, ExecutionResult, Services};
use crate::swarm::agent::Agent;
use crate::swarm::pipeline::{AgentRole, RoleSpec, ENDUSER_INTERVIEWER};
use crate::swarm::thinking::{DecisionLoop, LoopState, RoleBehavior};

action_set! {
    pub enum EndUserAction {
        Respond => "respond",
        /// Answer with a request to rephrase an unclear question
        Clarify => "clarify",
    }
}

/// Generate a reply, record it, and send it back to the interviewer
async fn reply(ctx: &ActionContext<'_>, action: EndUserAction, instruction: &str) -> ExecutionResult {
    let name = action.name();
    let services = ctx.services;
    let key = record::record_key(Channel::EndUser, ctx.conversation_id());
    let Ok(text) = record::read(services.store.as_ref(), &services.buckets.records, &key).await else {
        return ExecutionResult::error(name, "storage_failure");
    };

    let prompt = format!(
        "Interview so far:\n{}\n\nThe interviewer asks: {}\n\n{}",
        text, ctx.trigger.content, instruction
    );
    let answer = match ctx.generate(prompts::ENDUSER, &prompt).await {
        Ok(answer) if !answer.is_empty() => answer,
        Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
    };

    if record::append(
        services.store.as_ref(),
        &services.buckets.records,
        &key,
        Speaker::EndUser,
        &answer,
    )
    .await
    .is_err()
    {
        return ExecutionResult::error(name, "storage_failure");
    }

    let message = Message::new(MessageKind::Response, ctx.conversation_id())
        .from(AgentRole::EndUser.as_str())
        .to(AgentRole::Interviewer.as_str())
        .with_content(answer);
    if services.bus.publish(ENDUSER_INTERVIEWER, message).await.is_err() {
        return ExecutionResult::error(name, "publish_failure");
    }

    ExecutionResult::complete(name)
}

struct Respond;

#[async_trait]
impl Action for Respond {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        reply(
            ctx,
            EndUserAction::Respond,
            "Answer in first person, concretely, in two to five sentences.",
        )
        .await
    }
}

struct Clarify;

#[async_trait]
impl Action for Clarify {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        reply(
            ctx,
            EndUserAction::Clarify,
            "The question is unclear to you. Say what you did not understand and what you can tell already.",
        )
        .await
    }
}

pub struct EndUserBehavior;

impl RoleBehavior<EndUserAction> for EndUserBehavior {
    fn system_context(&self) -> &str {
        prompts::ENDUSER
    }

    fn build_request(&self, trigger: &Message, _state: &LoopState) -> String {
        format!(
            "The interviewer asks: {}\n\n\
             Choose respond to answer it, or clarify when the question cannot be answered as asked.",
            trigger.content
        )
    }

    fn default_decision(&self) -> Option<EndUserAction> {
        Some(EndUserAction::Respond)
    }
}

pub fn registry() -> ActionRegistry<EndUserAction> {
    ActionRegistry::new()
        .register(EndUserAction::Respond, Respond)
        .register(EndUserAction::Clarify, Clarify)
}

pub fn decision_loop(services: Services, config: &PipelineConfig) -> DecisionLoop<EndUserAction> {
    DecisionLoop::new(EndUserBehavior, registry(), services, config.max_iterations)
}

pub fn agent(spec: RoleSpec, services: Services, config: &PipelineConfig) -> Agent<EndUserAction> {
    Agent::new(spec, config.dedup_window, decision_loop(services, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::oracle::ScriptedOracle;
    use crate::store::InMemoryStore;
    use crate::error::OracleError;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_respond_records_and_replies() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let oracle = ScriptedOracle::from_actions(["respond"])
            .with_generator(|_, _| Ok("Mostly coaches booking evening slots.".to_string()));
        let services = Services::new(AgentRole::EndUser, store.clone(), bus.clone(), Arc::new(oracle));
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let question = Message::new(MessageKind::Question, "conv-1")
            .from("interviewer")
            .with_content("Who books the halls?");
        let outcome = lp.decide(&question).await;
        assert!(outcome.is_completed());

        let replies = bus.published(ENDUSER_INTERVIEWER);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].kind, MessageKind::Response);
        assert_eq!(replies[0].conversation_id, "conv-1");

        let text = record::read(store.as_ref(), "interview-records", "interview_record_conv-1.txt")
            .await
            .unwrap();
        assert_eq!(
            record::latest(&text, Speaker::EndUser).as_deref(),
            Some("Mostly coaches booking evening slots.")
        );
    }

    #[tokio::test]
    async fn test_invalid_choice_defaults_to_respond() {
        let bus = Arc::new(InMemoryBus::new());
        let services = Services::new(
            AgentRole::EndUser,
            Arc::new(InMemoryStore::new()),
            bus.clone(),
            Arc::new(ScriptedOracle::from_actions(["shrug"])),
        );
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let outcome = lp
            .decide(&Message::new(MessageKind::Question, "conv-1").with_content("Budget?"))
            .await;
        assert_eq!(outcome.action(), Some("respond"));
        assert_eq!(bus.published(ENDUSER_INTERVIEWER).len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_decision_still_replies() {
        let bus = Arc::new(InMemoryBus::new());
        let oracle = ScriptedOracle::new()
            .with_decider(|_| Err(OracleError::Malformed("not json".to_string())));
        let services = Services::new(
            AgentRole::EndUser,
            Arc::new(InMemoryStore::new()),
            bus.clone(),
            Arc::new(oracle),
        );
        let mut lp = decision_loop(services, &PipelineConfig::default());

        let outcome = lp
            .decide(&Message::new(MessageKind::Question, "conv-1").with_content("Budget?"))
            .await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.action(), Some("respond"));
        assert_eq!(bus.published(ENDUSER_INTERVIEWER).len(), 1);
    }
}
