//! # Interviewer Skill
//!
//! Runs the stakeholder interview with the end user. One question per
//! dialogue turn; the loop waits for the answer between turns. The interview
//! ends with the user requirements list, either because saturation is high
//! or because the turn cap forces it.

use async_trait::async_trait;
use serde_json::json;

use super::artifact_registry::store_and_announce;
use super::prompts;
use crate::action_set;
use crate::bus::{ArtifactKind, Message, MessageKind};
use crate::config::PipelineConfig;
use crate::error::StoreError;
use crate::oracle::extract_json;
use crate::state::record::{self, Channel, Speaker};
use crate::swarm::action::{Action, ActionContext, ActionRegistry, ActionSet, ExecutionResult, Services};
use crate::swarm::agent::Agent;
use crate::swarm::pipeline::{AgentRole, RoleSpec, INTERVIEWER_ENDUSER};
use crate::swarm::thinking::{DecisionLoop, LoopState, RoleBehavior};

/// Below this many questions saturation is not worth asking the oracle about
const MIN_TURNS_FOR_SATURATION: usize = 3;
const EARLY_SATURATION_SCORE: f64 = 0.2;
const UNPARSED_SATURATION_SCORE: f64 = 0.5;

action_set! {
    pub enum InterviewerAction {
        AskQuestion => "ask_question",
        RetrieveInterviewRecord => "retrieve_interview_record",
        EvaluateSaturation => "evaluate_saturation",
        GenerateUserRequirements => "generate_user_requirements",
    }
}

/// Read the transcript, recording the stakeholder's raw input on first contact
async fn transcript(ctx: &ActionContext<'_>) -> Result<String, StoreError> {
    let services = ctx.services;
    let key = record::record_key(Channel::EndUser, ctx.conversation_id());
    let text = record::read(services.store.as_ref(), &services.buckets.records, &key).await?;

    if ctx.trigger.kind == MessageKind::Input && record::count_turns(&text, Speaker::User) == 0 {
        return record::append(
            services.store.as_ref(),
            &services.buckets.records,
            &key,
            Speaker::User,
            &ctx.trigger.content,
        )
        .await;
    }
    Ok(text)
}

struct AskQuestion;

#[async_trait]
impl Action for AskQuestion {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = InterviewerAction::AskQuestion.name();
        let services = ctx.services;
        let Ok(text) = transcript(ctx).await else {
            return ExecutionResult::error(name, "storage_failure");
        };

        let prompt = format!(
            "Interview record so far:\n{}\n\nWhy a question now: {}\n\n\
             Ask the stakeholder ONE open-ended question that moves the interview forward. \
             Return only the question.",
            if text.is_empty() { "(empty)" } else { text.as_str() },
            ctx.rationale
        );
        let question = match ctx.generate(prompts::INTERVIEWER, &prompt).await {
            Ok(q) if !q.is_empty() => q,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        let key = record::record_key(Channel::EndUser, ctx.conversation_id());
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
            .from(AgentRole::Interviewer.as_str())
            .to(AgentRole::EndUser.as_str())
            .with_content(question.clone());
        if services.bus.publish(INTERVIEWER_ENDUSER, message).await.is_err() {
            return ExecutionResult::error(name, "publish_failure");
        }

        ExecutionResult::waiting(name).with_data(json!({ "question": question }))
    }
}

struct RetrieveInterviewRecord;

#[async_trait]
impl Action for RetrieveInterviewRecord {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = InterviewerAction::RetrieveInterviewRecord.name();
        match transcript(ctx).await {
            Ok(text) => {
                let total_turns = record::count_turns(&text, Speaker::Interviewer);
                ExecutionResult::proceed(
                    name,
                    json!({ "record_text": text, "total_turns": total_turns }),
                )
            }
            Err(_) => ExecutionResult::error(name, "storage_failure"),
        }
    }
}

struct EvaluateSaturation;

#[async_trait]
impl Action for EvaluateSaturation {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = InterviewerAction::EvaluateSaturation.name();
        let Ok(text) = transcript(ctx).await else {
            return ExecutionResult::error(name, "storage_failure");
        };

        let turns = record::count_turns(&text, Speaker::Interviewer);
        if turns < MIN_TURNS_FOR_SATURATION {
            return ExecutionResult::proceed(
                name,
                json!({
                    "saturation_score": EARLY_SATURATION_SCORE,
                    "recommendation": "continue",
                    "reasoning": format!("Only {} questions asked so far", turns),
                }),
            );
        }

        let prompt = format!(
            "Interview record:\n{}\n\n\
             Judge whether further questions would still surface new requirements. \
             Return JSON only: {{\"saturation_score\": 0.0-1.0, \"recommendation\": \"continue\" or \"stop\", \"reasoning\": \"...\"}}",
            text
        );
        let raw = match ctx.generate(prompts::INTERVIEWER, &prompt).await {
            Ok(raw) => raw,
            Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        let parsed = extract_json(&raw).unwrap_or_default();
        let score = parsed
            .get("saturation_score")
            .and_then(|v| v.as_f64())
            .unwrap_or(UNPARSED_SATURATION_SCORE)
            .clamp(0.0, 1.0);
        let recommendation = parsed
            .get("recommendation")
            .and_then(|v| v.as_str())
            .unwrap_or("continue");
        let reasoning = parsed
            .get("reasoning")
            .and_then(|v| v.as_str())
            .unwrap_or("saturation response could not be parsed");

        tracing::info!(score, turns, "Saturation evaluated");
        ExecutionResult::proceed(
            name,
            json!({
                "saturation_score": score,
                "recommendation": recommendation,
                "reasoning": reasoning,
            }),
        )
    }
}

struct GenerateUserRequirements;

#[async_trait]
impl Action for GenerateUserRequirements {
    async fn execute(&self, ctx: &ActionContext<'_>) -> ExecutionResult {
        let name = InterviewerAction::GenerateUserRequirements.name();
        let Ok(text) = transcript(ctx).await else {
            return ExecutionResult::error(name, "storage_failure");
        };

        let prompt = format!(
            "Interview record:\n{}\n\n\
             Write the user requirements list: numbered items, one need each, \
             in the stakeholder's words, each citing the turn it came from.",
            text
        );
        let document = match ctx.generate(prompts::INTERVIEWER, &prompt).await {
            Ok(doc) if !doc.is_empty() => doc,
            Ok(_) | Err(_) => return ExecutionResult::error(name, "generation_failure"),
        };

        match store_and_announce(ctx, ArtifactKind::UserRequirementsList, &document, &[text.as_str()]).await {
            Ok(artifact) => {
                ExecutionResult::complete(name).with_data(json!({ "artifact_key": artifact.key }))
            }
            Err(failure) => failure.into_result(name),
        }
    }
}

pub struct InterviewerBehavior {
    turn_cap: u32,
    saturation_threshold: f64,
}

impl InterviewerBehavior {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            turn_cap: config.enduser_turn_cap,
            saturation_threshold: config.saturation_threshold,
        }
    }
}

impl RoleBehavior<InterviewerAction> for InterviewerBehavior {
    fn system_context(&self) -> &str {
        prompts::INTERVIEWER
    }

    fn build_request(&self, trigger: &Message, state: &LoopState) -> String {
        let record_status = match state.cached("retrieve_interview_record") {
            Some(data) => format!(
                "RETRIEVED ({} questions asked)\n{}",
                data.get("total_turns").and_then(|v| v.as_u64()).unwrap_or(0),
                data.get("record_text").and_then(|v| v.as_str()).unwrap_or("")
            ),
            None => "NOT RETRIEVED".to_string(),
        };
        let saturation = match state.cached_f64("evaluate_saturation", "saturation_score") {
            Some(score) => format!(
                "EVALUATED (score {:.2}): {}",
                score,
                state
                    .cached_str("evaluate_saturation", "reasoning")
                    .unwrap_or("")
            ),
            None => "NOT EVALUATED".to_string(),
        };

        format!(
            "=== CURRENT STATE ===\n\
             Conversation turn: {} (cap {})\n\
             Trigger: {:?} from {}\n\
             Latest message: {}\n\
             Interview record: {}\n\
             Saturation: {}\n\n\
             === RULES ===\n\
             Turn 1: ask_question.\n\
             Turns 2-4: retrieve_interview_record if not retrieved, then ask_question.\n\
             Turn 5+: retrieve_interview_record, then evaluate_saturation, then \
             generate_user_requirements if saturation is above {:.2}, otherwise ask_question.",
            state.turns,
            self.turn_cap,
            trigger.kind,
            if trigger.sent_from.is_empty() { "user" } else { trigger.sent_from.as_str() },
            trigger.content,
            record_status,
            saturation,
            self.saturation_threshold,
        )
    }

    fn default_decision(&self) -> Option<InterviewerAction> {
        Some(InterviewerAction::AskQuestion)
    }

    fn route(&self, _trigger: &Message, state: &LoopState) -> Option<InterviewerAction> {
        let score = state.cached_f64("evaluate_saturation", "saturation_score")?;
        (score > self.saturation_threshold).then_some(InterviewerAction::GenerateUserRequirements)
    }

    fn turn_action(&self) -> Option<InterviewerAction> {
        Some(InterviewerAction::AskQuestion)
    }

    fn turn_cap(&self) -> Option<u32> {
        Some(self.turn_cap)
    }

    fn forced_action(&self) -> Option<InterviewerAction> {
        Some(InterviewerAction::GenerateUserRequirements)
    }
}

pub fn registry() -> ActionRegistry<InterviewerAction> {
    ActionRegistry::new()
        .register(InterviewerAction::AskQuestion, AskQuestion)
        .register(InterviewerAction::RetrieveInterviewRecord, RetrieveInterviewRecord)
        .register(InterviewerAction::EvaluateSaturation, EvaluateSaturation)
        .register(InterviewerAction::GenerateUserRequirements, GenerateUserRequirements)
}

pub fn decision_loop(services: Services, config: &PipelineConfig) -> DecisionLoop<InterviewerAction> {
    DecisionLoop::new(
        InterviewerBehavior::new(config),
        registry(),
        services,
        config.max_iterations,
    )
}

pub fn agent(spec: RoleSpec, services: Services, config: &PipelineConfig) -> Agent<InterviewerAction> {
    Agent::new(spec, config.dedup_window, decision_loop(services, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBus, ARTIFACT_EVENTS};
    use crate::oracle::{RawDecision, ScriptedOracle};
    use crate::store::{self, InMemoryStore};
    use crate::swarm::thinking::LoopOutcome;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryStore>,
        bus: Arc<InMemoryBus>,
        oracle: Arc<ScriptedOracle>,
        services: Services,
    }

    fn fixture(oracle: ScriptedOracle) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let oracle = Arc::new(oracle);
        let services = Services::new(AgentRole::Interviewer, store.clone(), bus.clone(), oracle.clone());
        Fixture {
            store,
            bus,
            oracle,
            services,
        }
    }

    fn input() -> Message {
        Message::new(MessageKind::Input, "conv-1")
            .from("user")
            .with_content("We need an app to book community sports halls.")
    }

    fn response(text: &str) -> Message {
        Message::new(MessageKind::Response, "conv-1")
            .from(AgentRole::EndUser.as_str())
            .with_content(text)
    }

    #[test]
    fn test_registry_covers_action_set() {
        assert!(registry().missing().is_empty());
    }

    #[tokio::test]
    async fn test_first_turn_asks_and_waits() {
        let oracle = ScriptedOracle::from_actions(["ask_question"])
            .with_generator(|_, _| Ok("Who books the halls today?".to_string()));
        let f = fixture(oracle);
        let mut lp = decision_loop(f.services.clone(), &PipelineConfig::default());

        let outcome = lp.decide(&input()).await;
        assert!(matches!(outcome, LoopOutcome::Waiting { .. }));

        let questions = f.bus.published(INTERVIEWER_ENDUSER);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].content, "Who books the halls today?");
        assert_eq!(questions[0].sent_to, "end_user");

        let text = store::read_text(
            f.store.as_ref(),
            "interview-records",
            &record::record_key(Channel::EndUser, "conv-1"),
        )
        .await
        .unwrap();
        assert_eq!(record::count_turns(&text, Speaker::User), 1);
        assert_eq!(record::count_turns(&text, Speaker::Interviewer), 1);
        assert_eq!(lp.turn("conv-1"), 2);
    }

    #[tokio::test]
    async fn test_turn_cap_forces_user_requirements() {
        let oracle = ScriptedOracle::new()
            .with_decider(|_| Ok(RawDecision::new("ask_question", "always ask")))
            .with_generator(|_, prompt| {
                Ok(if prompt.contains("user requirements list") {
                    "1. Book a hall online".to_string()
                } else {
                    "Another question?".to_string()
                })
            });
        let f = fixture(oracle);
        let config = PipelineConfig {
            enduser_turn_cap: 15,
            ..PipelineConfig::default()
        };
        let mut lp = decision_loop(f.services.clone(), &config);

        assert!(matches!(lp.decide(&input()).await, LoopOutcome::Waiting { .. }));
        for i in 1..15 {
            let outcome = lp.decide(&response(&format!("answer {}", i))).await;
            assert!(matches!(outcome, LoopOutcome::Waiting { .. }), "turn {}", i + 1);
        }
        assert_eq!(lp.turn("conv-1"), 16);

        let outcome = lp.decide(&response("answer 15")).await;
        assert!(matches!(
            outcome,
            LoopOutcome::Completed { ref action, forced: true, .. } if action == "generate_user_requirements"
        ));
        assert_eq!(f.bus.published(INTERVIEWER_ENDUSER).len(), 15);

        let announcements = f.bus.published(ARTIFACT_EVENTS);
        assert_eq!(announcements.len(), 1);
        let artifact = announcements[0].announced().unwrap();
        assert_eq!(artifact.kind, ArtifactKind::UserRequirementsList);
        assert_eq!(
            store::read_text(f.store.as_ref(), &artifact.bucket, &artifact.key)
                .await
                .unwrap(),
            "1. Book a hall online"
        );
        assert_eq!(lp.turn("conv-1"), 1);
    }

    #[tokio::test]
    async fn test_high_saturation_routes_to_requirements() {
        let oracle = ScriptedOracle::from_actions(["retrieve_interview_record", "evaluate_saturation"])
            .with_generator(|_, prompt| {
                Ok(if prompt.contains("saturation_score") {
                    r#"{"saturation_score": 0.93, "recommendation": "stop", "reasoning": "answers repeat"}"#.to_string()
                } else {
                    "1. Requirement".to_string()
                })
            });
        let f = fixture(oracle);
        let key = record::record_key(Channel::EndUser, "conv-1");
        for i in 0..5 {
            record::append(f.store.as_ref(), "interview-records", &key, Speaker::Interviewer, &format!("q{}", i))
                .await
                .unwrap();
        }
        let mut lp = decision_loop(f.services.clone(), &PipelineConfig::default());

        let outcome = lp.decide(&response("same as before")).await;
        assert!(matches!(
            outcome,
            LoopOutcome::Completed { ref action, forced: false, iterations: 3 } if action == "generate_user_requirements"
        ));
        assert_eq!(f.bus.published(ARTIFACT_EVENTS).len(), 1);
    }

    #[tokio::test]
    async fn test_early_saturation_skips_generation() {
        let oracle = ScriptedOracle::from_actions(["evaluate_saturation", "ask_question"])
            .with_generator(|_, _| Ok("Next question?".to_string()));
        let f = fixture(oracle);
        let mut lp = decision_loop(f.services.clone(), &PipelineConfig::default());

        assert!(matches!(lp.decide(&response("hi")).await, LoopOutcome::Waiting { iterations: 2, .. }));
        // Only the question needed generated text
        assert_eq!(f.oracle.generation_count(), 1);
        assert_eq!(f.oracle.decision_count(), 2);
        assert!(f.oracle.requests()[1].request.contains("EVALUATED (score 0.20)"));
    }

    #[tokio::test]
    async fn test_generation_failure_is_error() {
        let oracle = ScriptedOracle::from_actions(["ask_question"])
            .with_generator(|_, _| Err(crate::error::OracleError::Transport("down".to_string())));
        let f = fixture(oracle);
        let mut lp = decision_loop(f.services.clone(), &PipelineConfig::default());

        let outcome = lp.decide(&input()).await;
        assert_eq!(
            outcome,
            LoopOutcome::Failed {
                action: "ask_question".to_string(),
                reason: "generation_failure".to_string()
            }
        );
        assert!(f.bus.published(INTERVIEWER_ENDUSER).is_empty());
    }
}
