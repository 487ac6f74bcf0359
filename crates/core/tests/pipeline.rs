use std::sync::Arc;

use serde_json::json;
use specforge_core::bus::{ArtifactKind, ArtifactRef, InMemoryBus, Message, ARTIFACT_EVENTS};
use specforge_core::config::PipelineConfig;
use specforge_core::oracle::{DecisionOracle, OracleRequest, RawDecision, ScriptedOracle};
use specforge_core::skills::{analyst, reviewer};
use specforge_core::store::{self, ArtifactStore, InMemoryStore};
use specforge_core::swarm::{
    AgentRole, Coordinator, LoopOutcome, PipelineStage, PipelineTopology, Services,
};

const CRITERIA: [&str; 7] = [
    "infrastructure",
    "security",
    "scalability",
    "database",
    "deployment_process",
    "monitoring",
    "compliance",
];

fn decide(request: &OracleRequest) -> Result<RawDecision, specforge_core::error::OracleError> {
    let action = if request.role == "analyst" {
        if request.request.contains("System requirements: NOT GENERATED") {
            "generate_system_requirements"
        } else {
            "choose_requirement_model"
        }
    } else {
        request.allowed_actions[0].as_str()
    };
    Ok(RawDecision::new(action, "scripted"))
}

fn generate(prompt: &str) -> String {
    if prompt.contains("\"evaluations\"") {
        let evaluations: Vec<_> = CRITERIA
            .iter()
            .map(|k| json!({"criteria_key": k, "is_answered": true, "is_sufficient": true}))
            .collect();
        json!({ "evaluations": evaluations }).to_string()
    } else if prompt.contains("Which notation") {
        "Use case diagram".to_string()
    } else {
        format!("generated from: {}", prompt.lines().next().unwrap_or_default())
    }
}

fn scripted() -> ScriptedOracle {
    ScriptedOracle::new()
        .with_decider(decide)
        .with_generator(|_, prompt| Ok(generate(prompt)))
}

async fn stored(store: &InMemoryStore, kind: ArtifactKind, key: &str, content: &str) -> ArtifactRef {
    let artifact = ArtifactRef::new(kind, "requirements-artifacts", key);
    store
        .put(&artifact.bucket, &artifact.key, content.as_bytes().to_vec())
        .await
        .unwrap();
    artifact
}

#[tokio::test]
async fn full_pipeline_produces_reviewed_specification() {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let config = PipelineConfig {
        enduser_turn_cap: 2,
        deployer_turn_cap: 3,
        run_timeout_secs: 20,
        ..PipelineConfig::default()
    };

    let mut coordinator = Coordinator::new(config, store.clone(), bus.clone())
        .with_oracle_factory(|_, _| Arc::new(scripted()) as Arc<dyn DecisionOracle>);
    let summary = coordinator
        .run_conversation("conv-full", "An app to book community sports halls")
        .await
        .unwrap();
    coordinator.shutdown();

    assert!(summary.is_success(), "stage was {:?}", summary.stage);
    assert_eq!(summary.stage, PipelineStage::Complete);
    for kind in ArtifactKind::all() {
        assert!(summary.artifact(kind).is_some(), "missing {}", kind);
    }

    let reviewed = summary.reviewed().unwrap();
    let text = store::read_text(store.as_ref(), &reviewed.bucket, &reviewed.key)
        .await
        .unwrap();
    assert!(text.starts_with("generated from:"));

    // Two questions before the cap forced the user requirements
    let transcript = store::read_text(
        store.as_ref(),
        "interview-records",
        "interview_record_conv-full.txt",
    )
    .await
    .unwrap();
    assert_eq!(transcript.matches("] Interviewer: ").count(), 2);
    assert_eq!(transcript.matches("] User: ").count(), 1);
}

#[tokio::test]
async fn analyst_join_fires_once_regardless_of_order() {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let config = PipelineConfig::default();
    let spec = PipelineTopology::reference(&config)
        .role(AgentRole::Analyst)
        .unwrap()
        .clone();
    let services = Services::new(AgentRole::Analyst, store.clone(), bus.clone(), Arc::new(scripted()));
    let mut agent = analyst::agent(spec, services, &config);

    let environment = stored(&store, ArtifactKind::OperatingEnvironmentList, "c/oel.md", "Two VMs").await;
    let requirements = stored(&store, ArtifactKind::UserRequirementsList, "c/url.md", "1. Book").await;
    let second = Message::announcement("artifact-url", "c", requirements);

    assert_eq!(
        agent.handle(Message::announcement("artifact-oel", "c", environment)).await,
        None
    );
    let outcome = agent.handle(second.clone()).await.unwrap();
    assert!(matches!(
        outcome,
        LoopOutcome::Completed { ref action, .. } if action == "generate_requirement_model"
    ));

    // Redelivery is absorbed by dedup
    assert_eq!(agent.handle(second).await, None);

    let announced: Vec<_> = bus
        .published(ARTIFACT_EVENTS)
        .iter()
        .filter_map(|m| m.announced().map(|a| a.kind))
        .collect();
    assert_eq!(
        announced,
        vec![ArtifactKind::SystemRequirementsList, ArtifactKind::RequirementsModel]
    );
}

#[tokio::test]
async fn reviewer_ignores_unrelated_and_duplicate_announcements() {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let config = PipelineConfig::default();
    let spec = PipelineTopology::reference(&config)
        .role(AgentRole::Reviewer)
        .unwrap()
        .clone();
    let services = Services::new(AgentRole::Reviewer, store.clone(), bus.clone(), Arc::new(scripted()));
    let mut agent = reviewer::agent(spec, services, &config);

    let model = stored(&store, ArtifactKind::RequirementsModel, "c/model.md", "@startuml").await;
    assert_eq!(agent.handle(Message::announcement("artifact-m", "c", model)).await, None);

    let srs = stored(
        &store,
        ArtifactKind::SoftwareRequirementsSpecification,
        "c/srs.md",
        "# SRS",
    )
    .await;
    let announcement = Message::announcement("artifact-srs", "c", srs);
    assert!(agent.handle(announcement.clone()).await.unwrap().is_completed());
    assert_eq!(agent.handle(announcement).await, None);

    assert_eq!(bus.published(ARTIFACT_EVENTS).len(), 1);
}

#[tokio::test]
async fn invalid_decisions_have_no_side_effects() {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let config = PipelineConfig::default();
    let oracle = ScriptedOracle::from_actions(["rm -rf /"]);
    let services = Services::new(AgentRole::Analyst, store.clone(), bus.clone(), Arc::new(oracle));
    let mut lp = analyst::decision_loop(services, &config);

    let outcome = lp
        .decide(&Message::new(specforge_core::bus::MessageKind::Trigger, "c"))
        .await;
    assert_eq!(
        outcome,
        LoopOutcome::Failed {
            action: "rm -rf /".to_string(),
            reason: "unknown_action_rm -rf /".to_string(),
        }
    );
    assert_eq!(bus.published_count(), 0);
    assert!(store.is_empty());
}
