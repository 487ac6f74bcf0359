//! # Deployment Interview
//!
//! Two roles share this module. The deployment interviewer starts when the
//! user requirements list is announced and questions the deployer until
//! every criterion in the [`CriteriaChecklist`](crate::state::CriteriaChecklist)
//! is answered and sufficient, then writes the operating environment list.
//! The deployer answers those questions.
//!
//! Each deployer response is evaluated exactly once per invocation; a fully
//! sufficient checklist routes straight to generation without consulting
//! the oracle.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::artifact_registry::store_and_announce;
use super::prompts;
use crate::action_set;
use crate::bus::{ArtifactKind, Message, MessageKind};
use crate::config::PipelineConfig;
use crate::error::StoreError;
use crate::oracle::extract_json;
use crate::state::checklist::{CriterionEvaluation, DeploymentState};
use crate::state::record::{self, Channel, Speaker};
use crate::store;
use crate::swarm::action::{Action, ActionContext, ActionRegistry, ActionSet, ExecutionResult, Services};
use crate::swarm::agent::Agent;
use crate::swarm::pipeline::{AgentRole, RoleSpec, DEPLOYER_INTERVIEWER, INTERVIEWER_DEPLOYER};
use crate::swarm::thinking::{DecisionLoop, LoopState, RoleBehavior};

action_set! {
    pub enum DeploymentInterviewAction {
        AskDeployer => "ask_deployer",
        EvaluateResponse => "evaluate_response",
        GenerateOperatingEnvironment => "generate_operating_environment",
    }
}

action_set! {
    pub enum DeployerAction {
        Respond => "respond",
    }
}

#[derive(Debug, Deserialize)]
struct EvaluationBatch {
    #[serde(default)]
    evaluations: Vec<CriterionEvaluation>,
}

async fn load_state(ctx: &ActionContext<'_>) -> Result<DeploymentState, StoreError> {
    let services = ctx.services;
    let mut state =
        DeploymentState::load(services.store.as_ref(), &services.buckets.state, ctx.conversation_id())
            .await?;
    // A newer announcement replaces the requirements the interview works from
    if let Some(artifact) = ctx.trigger.artifact(ArtifactKind::UserRequirementsList) {
        if state.user_requirements.as_ref() != Some(artifact) {
            state.user_requirements = Some(artifact.clone());
            state
                .save(services.store.as_ref(), &services.buckets.state, ctx.conversation_id())
                .await?;
        }
    }
    Ok(state)
}

async fn transcript(ctx: &ActionContext<'_>) -> Result<String, StoreError> {
    let services = ctx.services;
    let key = record::record_key(Channel::Deployer, ctx.conversation_id());
    record::read(services.store.as_ref(), &services.buckets.records, &key).await
}

struct AskDeployer;

#[async_trait]
impl Action for AskDeployer {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = DeploymentInterviewAction::AskDeployer.name();
        let services = ctx.services;
        let (Ok(state), Ok(text)) = (load_state(ctx).await, transcript(ctx).await) else {
            return ExecutionResult::error(name, "storage_failure");
        };

        let prompt = format!(
            "Deployment interview so far:\n{}\n\nCriteria still open:\n{}\n\n\
             Ask the deployer ONE question that covers the most important open criterion. \
             Return only the question.",
            if text.is_empty() { "(empty)" } else { text.as_str() },
            state.checklist.render_unresolved()
        );
        let question = match ctx.generate(prompts::DEPLOYER_INTERVIEWER, &prompt).await {
            Ok(q) if !q.is_empty() => q,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        let key = record::record_key(Channel::Deployer, ctx.conversation_id());
        if record::append(
            services.store.as_ref(),
            &services.buckets.records,
            &key,
            Speaker::Interviewer,
            &question,
        )
        .await
        .is_err()
        {
            return ExecutionResult::error(name, "storage_failure");
        }

        let message = Message::new(MessageKind::Question, ctx.conversation_id())
            .from(AgentRole::DeployerInterviewer.as_str())
            .to(AgentRole::Deployer.as_str())
            .with_content(question.clone());
        if services.bus.publish(INTERVIEWER_DEPLOYER, message).await.is_err() {
            return ExecutionResult::error(name, "publish_failure");
        }

        ExecutionResult::waiting(name).with_data(json!({ "question": question }))
    }
}

struct EvaluateResponse;

#[async_trait]
impl Action for EvaluateResponse {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = DeploymentInterviewAction::EvaluateResponse.name();
        let services = ctx.services;
        let Ok(mut state) = load_state(ctx).await else {
            return ExecutionResult::error(name, "storage_failure");
        };

        if !state.checklist.all_sufficient() && ctx.trigger.kind == MessageKind::Response {
            let prompt = format!(
                "Deployer response:\n{}\n\nCriteria still open:\n{}\n\n\
                 For each open criterion decide whether the response answers it and whether \
                 the answer is specific enough to build on. Return JSON only:\n\
                 {{\"evaluations\": [{{\"criteria_key\": \"...\", \"is_answered\": true, \"is_sufficient\": false, \"reasoning\": \"...\"}}]}}",
                ctx.trigger.content,
                state.checklist.render_unresolved()
            );
            let raw = match ctx.generate(prompts::DEPLOYER_INTERVIEWER, &prompt).await {
                Ok(raw) => raw,
                Err(_) => return ExecutionResult::error(name, "generation_failure"),
            };

            let batch = extract_json(&raw)
                .and_then(|value| serde_json::from_value::<EvaluationBatch>(value).ok());
            match batch {
                Some(batch) => {
                    let applied = state.checklist.apply(&batch.evaluations);
                    tracing::debug!(applied, "Criteria evaluations applied");
                }
                None => tracing::warn!("Evaluation response could not be parsed, checklist unchanged"),
            }
            state.evaluations += 1;

            if state
                .save(services.store.as_ref(), &services.buckets.state, ctx.conversation_id())
                .await
                .is_err()
            {
                return ExecutionResult::error(name, "storage_failure");
            }
        }

        let checklist = &state.checklist;
        tracing::info!(
            sufficient = checklist.sufficient_count(),
            total = checklist.criteria().len(),
            "Deployment criteria evaluated"
        );
        ExecutionResult::proceed(
            name,
            json!({
                "all_sufficient": checklist.all_sufficient(),
                "sufficient_count": checklist.sufficient_count(),
                "unresolved": checklist.unresolved_keys(),
            }),
        )
    }
}

struct GenerateOperatingEnvironment;

#[async_trait]
impl Action for GenerateOperatingEnvironment {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = DeploymentInterviewAction::GenerateOperatingEnvironment.name();
        let services = ctx.services;
        let (Ok(state), Ok(text)) = (load_state(ctx).await, transcript(ctx).await) else {
            return ExecutionResult::error(name, "storage_failure");
        };
        let requirements = match &state.user_requirements {
            Some(artifact) => {
                match store::read_text(services.store.as_ref(), &artifact.bucket, &artifact.key).await {
                    Ok(text) => text,
                    Err(_) => return ExecutionResult::error(name, "storage_failure"),
                }
            }
            None => String::new(),
        };

        let prompt = format!(
            "User requirements:\n{}\n\nDeployment interview:\n{}\n\nCriteria status:\n{}\n\n\
             Write the operating environment list: one section per criterion, stating what \
             the deployer committed to and marking anything still open as an assumption.",
            requirements,
            text,
            state.checklist.render()
        );
        let document = match ctx.generate(prompts::DEPLOYER_INTERVIEWER, &prompt).await {
            Ok(doc) if !doc.is_empty() => doc,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        match store_and_announce(
            ctx,
            ArtifactKind::OperatingEnvironmentList,
            &document,
            &[requirements.as_str(), text.as_str()],
        )
        .await
        {
            Ok(artifact) => {
                ExecutionResult::complete(name).with_data(json!({ "artifact_key": artifact.key }))
            }
            Err(failure) => failure.into_result(name),
        }
    }
}

pub struct DeploymentInterviewBehavior {
    turn_cap: u32,
}

impl DeploymentInterviewBehavior {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            turn_cap: config.deployer_turn_cap,
        }
    }
}

impl RoleBehavior<DeploymentInterviewAction> for DeploymentInterviewBehavior {
    fn system_context(&self) -> &str {
        prompts::DEPLOYER_INTERVIEWER
    }

    fn build_request(&self, trigger: &Message, state: &LoopState) -> String {
        let evaluation = match state.cached("evaluate_response") {
            Some(data) => format!(
                "{} of 7 criteria sufficient, open: {}",
                data.get("sufficient_count").and_then(|v| v.as_u64()).unwrap_or(0),
                data.get("unresolved").map(|v| v.to_string()).unwrap_or_default()
            ),
            None => "NOT EVALUATED".to_string(),
        };
        format!(
            "=== CURRENT STATE ===\n\
             Conversation turn: {} (cap {})\n\
             Trigger: {:?}\n\
             Latest message: {}\n\
             Criteria: {}\n\n\
             === RULES ===\n\
             After a deployer response: evaluate_response first.\n\
             While any criterion is open: ask_deployer.\n\
             When every criterion is sufficient: generate_operating_environment.",
            state.turns,
            self.turn_cap,
            trigger.kind,
            trigger.content,
            evaluation,
        )
    }

    fn default_decision(&self) -> Option<DeploymentInterviewAction> {
        Some(DeploymentInterviewAction::AskDeployer)
    }

    fn route(&self, trigger: &Message, state: &LoopState) -> Option<DeploymentInterviewAction> {
        match state.cached_bool("evaluate_response", "all_sufficient") {
            Some(true) => Some(DeploymentInterviewAction::GenerateOperatingEnvironment),
            Some(false) => None,
            None if trigger.kind == MessageKind::Response => {
                Some(DeploymentInterviewAction::EvaluateResponse)
            }
            None => None,
        }
    }

    fn turn_action(&self) -> Option<DeploymentInterviewAction> {
        Some(DeploymentInterviewAction::AskDeployer)
    }

    fn turn_cap(&self) -> Option<u32> {
        Some(self.turn_cap)
    }

    fn forced_action(&self) -> Option<DeploymentInterviewAction> {
        Some(DeploymentInterviewAction::GenerateOperatingEnvironment)
    }
}

struct Respond;

#[async_trait]
impl Action for Respond {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = DeployerAction::Respond.name();
        let services = ctx.services;
        let Ok(text) = transcript(ctx).await else {
            return ExecutionResult::error(name, "storage_failure");
        };

        let prompt = format!(
            "Interview so far:\n{}\n\nThe interviewer asks: {}\n\n\
             Answer as the person who will run the system in production. Be specific about \
             numbers, products and procedures.",
            text, ctx.trigger.content
        );
        let answer = match ctx.generate(prompts::DEPLOYER, &prompt).await {
            Ok(answer) if !answer.is_empty() => answer,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        let key = record::record_key(Channel::Deployer, ctx.conversation_id());
        if record::append(
            services.store.as_ref(),
            &services.buckets.records,
            &key,
            Speaker::Deployer,
            &answer,
        )
        .await
        .is_err()
        {
            return ExecutionResult::error(name, "storage_failure");
        }

        let message = Message::new(MessageKind::Response, ctx.conversation_id())
            .from(AgentRole::Deployer.as_str())
            .to(AgentRole::DeployerInterviewer.as_str())
            .with_content(answer);
        if services.bus.publish(DEPLOYER_INTERVIEWER, message).await.is_err() {
            return ExecutionResult::error(name, "publish_failure");
        }
        ExecutionResult::complete(name)
    }
}

pub struct DeployerBehavior;

impl RoleBehavior<DeployerAction> for DeployerBehavior {
    fn system_context(&self) -> &str {
        prompts::DEPLOYER
    }

    fn build_request(&self, trigger: &Message, _state: &LoopState) -> String {
        format!("The deployment interviewer asks: {}", trigger.content)
    }

    fn default_decision(&self) -> Option<DeployerAction> {
        Some(DeployerAction::Respond)
    }
}

pub fn interviewer_registry() -> ActionRegistry<DeploymentInterviewAction> {
    ActionRegistry::new()
        .register(DeploymentInterviewAction::AskDeployer, AskDeployer)
        .register(DeploymentInterviewAction::EvaluateResponse, EvaluateResponse)
        .register(
            DeploymentInterviewAction::GenerateOperatingEnvironment,
            GenerateOperatingEnvironment,
        )
}

pub fn deployer_registry() -> ActionRegistry<DeployerAction> {
    ActionRegistry::new().register(DeployerAction::Respond, Respond)
}

pub fn interviewer_loop(
    services: Services,
    config: &PipelineConfig,
) -> DecisionLoop<DeploymentInterviewAction> {
    DecisionLoop::new(
        DeploymentInterviewBehavior::new(config),
        interviewer_registry(),
        services,
        config.max_iterations,
    )
}

pub fn deployer_loop(services: Services, config: &PipelineConfig) -> DecisionLoop<DeployerAction> {
    DecisionLoop::new(DeployerBehavior, deployer_registry(), services, config.max_iterations)
}

pub fn interviewer_agent(
    spec: RoleSpec,
    services: Services,
    config: &PipelineConfig,
) -> Agent<DeploymentInterviewAction> {
    Agent::new(spec, config.dedup_window, interviewer_loop(services, config))
}

pub fn deployer_agent(spec: RoleSpec, services: Services, config: &PipelineConfig) -> Agent<DeployerAction> {
    Agent::new(spec, config.dedup_window, deployer_loop(services, config))
}
