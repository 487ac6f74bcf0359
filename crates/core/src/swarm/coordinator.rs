//! # Swarm Coordinator
//!
//! Wires the reference topology onto a store and a bus, spawns one listener
//! per role, and drives a run from human input to the reviewed
//! specification. The coordinator never talks to agents directly: it
//! publishes the input and watches `artifact_events` like any other
//! consumer.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::bus::{ArtifactKind, ArtifactRef, Message, MessageBus, MessageKind, Subscription, ARTIFACT_EVENTS};
use crate::config::PipelineConfig;
use crate::models::ModelConfig;
use crate::oracle::{DecisionOracle, LlmOracle};
use crate::skills::{analyst, archivist, deployer, enduser, interviewer, reviewer};
use crate::store::ArtifactStore;

use super::action::Services;
use super::agent::{self, AgentHandle};
use super::events::{SwarmEvent, SwarmEventKind};
use super::pipeline::{AgentRole, Pipeline, PipelineStage, PipelineTopology, RoleSpec, USER_INTERVIEWER};

/// Builds the oracle for one role from its resolved model settings
pub type OracleFactory = Arc<dyn Fn(AgentRole, ModelConfig) -> Arc<dyn DecisionOracle> + Send + Sync>;

const COORDINATOR: &str = "coordinator";

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub conversation_id: String,
    pub stage: PipelineStage,
    /// Every artifact announced for this conversation, in arrival order
    pub artifacts: Vec<ArtifactRef>,
    /// Events observed during the run
    pub events: Vec<SwarmEvent>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }

    /// Latest announcement of a kind
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactRef> {
        self.artifacts.iter().rev().find(|a| a.kind == kind)
    }

    pub fn reviewed(&self) -> Option<&ArtifactRef> {
        self.artifact(ArtifactKind::ReviewedSpecification)
    }
}

/// The swarm coordinator
pub struct Coordinator {
    config: PipelineConfig,
    topology: PipelineTopology,
    store: Arc<dyn ArtifactStore>,
    bus: Arc<dyn MessageBus>,
    oracle_factory: OracleFactory,
    event_tx: Option<mpsc::Sender<SwarmEvent>>,
    agents: Vec<AgentHandle>,
    watcher: Option<Subscription>,
}

impl Coordinator {
    pub fn new(config: PipelineConfig, store: Arc<dyn ArtifactStore>, bus: Arc<dyn MessageBus>) -> Self {
        let topology = PipelineTopology::reference(&config);
        Self {
            config,
            topology,
            store,
            bus,
            oracle_factory: Arc::new(|_, model| Arc::new(LlmOracle::new(model)) as Arc<dyn DecisionOracle>),
            event_tx: None,
            agents: Vec::new(),
            watcher: None,
        }
    }

    /// Replace the LLM-backed oracles (tests, offline runs)
    pub fn with_oracle_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(AgentRole, ModelConfig) -> Arc<dyn DecisionOracle> + Send + Sync + 'static,
    {
        self.oracle_factory = Arc::new(factory);
        self
    }

    /// Set event channel for streaming events. The receiver must be drained;
    /// agents wait on a full channel.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<SwarmEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn topology(&self) -> &PipelineTopology {
        &self.topology
    }

    pub fn agents(&self) -> &[AgentHandle] {
        &self.agents
    }

    fn services(&self, role: AgentRole) -> Services {
        let model = self.config.models.resolve(role.as_str());
        tracing::debug!(%role, provider = ?model.provider, model = %model.model, "Resolved model");
        let oracle = (self.oracle_factory)(role, model);
        let services = Services::new(role, self.store.clone(), self.bus.clone(), oracle)
            .with_buckets(self.config.buckets.clone());
        match &self.event_tx {
            Some(tx) => services.with_events(tx.clone()),
            None => services,
        }
    }

    async fn spawn_role(&self, spec: RoleSpec) -> Result<AgentHandle> {
        let role = spec.role;
        let services = self.services(role);
        let config = &self.config;
        let handle = match role {
            AgentRole::Interviewer => agent::spawn(interviewer::agent(spec, services, config)).await,
            AgentRole::EndUser => agent::spawn(enduser::agent(spec, services, config)).await,
            AgentRole::DeployerInterviewer => {
                agent::spawn(deployer::interviewer_agent(spec, services, config)).await
            }
            AgentRole::Deployer => agent::spawn(deployer::deployer_agent(spec, services, config)).await,
            AgentRole::Analyst => agent::spawn(analyst::agent(spec, services, config)).await,
            AgentRole::Archivist => agent::spawn(archivist::agent(spec, services, config)).await,
            AgentRole::Reviewer => agent::spawn(reviewer::agent(spec, services, config)).await,
        };
        handle.with_context(|| format!("Failed to subscribe agent {}", role))
    }

    /// Subscribe and start every role of the topology. Idempotent.
    pub async fn spawn_agents(&mut self) -> Result<()> {
        if !self.agents.is_empty() {
            return Ok(());
        }

        // Watch before any agent can announce
        let watcher = self
            .bus
            .subscribe(&[ARTIFACT_EVENTS], COORDINATOR)
            .await
            .context("Failed to subscribe coordinator")?;
        self.watcher = Some(watcher);

        let specs: Vec<RoleSpec> = self.topology.roles().to_vec();
        for spec in specs {
            let handle = self.spawn_role(spec).await?;
            self.agents.push(handle);
        }
        tracing::info!(agents = self.agents.len(), "Swarm started");
        Ok(())
    }

    /// Roles whose listener task has ended
    pub fn stopped_agents(&self) -> Vec<&'static str> {
        self.agents
            .iter()
            .filter(|handle| handle.is_finished())
            .map(|handle| handle.role.as_str())
            .collect()
    }

    async fn emit(&self, events: &mut Vec<SwarmEvent>, event: SwarmEvent) {
        events.push(event.clone());
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Run the pipeline for a fresh conversation
    pub async fn run(&mut self, input: &str) -> Result<RunSummary> {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        self.run_conversation(&conversation_id, input).await
    }

    /// Publish the human input and wait for the reviewed specification
    #[tracing::instrument(skip(self, input), fields(input_preview = %input.chars().take(50).collect::<String>()))]
    pub async fn run_conversation(&mut self, conversation_id: &str, input: &str) -> Result<RunSummary> {
        self.spawn_agents().await?;
        let mut events = Vec::new();

        let message = Message::new(MessageKind::Input, conversation_id)
            .from("user")
            .to(AgentRole::Interviewer.as_str())
            .with_content(input);
        self.bus
            .publish(USER_INTERVIEWER, message)
            .await
            .context("Failed to publish input")?;
        self.emit(
            &mut events,
            SwarmEvent::new(SwarmEventKind::PipelineStarted, COORDINATOR).with_conversation(conversation_id),
        )
        .await;
        tracing::info!(%conversation_id, "Pipeline started");

        let mut watcher = self
            .watcher
            .take()
            .context("Coordinator watcher missing")?;
        let mut pipeline = Pipeline::new();
        let mut artifacts = Vec::new();
        let timeout = Duration::from_secs(self.config.run_timeout_secs);

        let waited = tokio::time::timeout(timeout, async {
            while let Some(delivery) = watcher.recv().await {
                let message = delivery.message;
                if message.conversation_id != conversation_id {
                    continue;
                }
                let Some(artifact) = message.announced().cloned() else {
                    continue;
                };
                let stage = pipeline.observe(artifact.kind);
                tracing::info!(kind = %artifact.kind, key = %artifact.key, ?stage, "Artifact observed");
                artifacts.push(artifact);
                if pipeline.is_success() {
                    return true;
                }
            }
            false
        })
        .await;
        self.watcher = Some(watcher);

        match waited {
            Ok(true) => {
                self.emit(
                    &mut events,
                    SwarmEvent::new(SwarmEventKind::PipelineCompleted, COORDINATOR)
                        .with_conversation(conversation_id)
                        .with_data(serde_json::json!({ "artifacts": artifacts.len() })),
                )
                .await;
                tracing::info!(%conversation_id, "Pipeline complete");
            }
            Ok(false) => {
                pipeline.fail();
                self.emit(
                    &mut events,
                    SwarmEvent::new(SwarmEventKind::PipelineFailed, COORDINATOR)
                        .with_conversation(conversation_id)
                        .with_data(serde_json::json!({ "reason": "bus_closed", "stopped_agents": self.stopped_agents() })),
                )
                .await;
                tracing::warn!(%conversation_id, "Bus closed before the pipeline finished");
            }
            Err(_) => {
                pipeline.fail();
                self.emit(
                    &mut events,
                    SwarmEvent::new(SwarmEventKind::PipelineFailed, COORDINATOR)
                        .with_conversation(conversation_id)
                        .with_data(serde_json::json!({ "reason": "timeout", "stopped_agents": self.stopped_agents() })),
                )
                .await;
                tracing::warn!(%conversation_id, timeout_secs = timeout.as_secs(), "Pipeline timed out");
            }
        }

        Ok(RunSummary {
            conversation_id: conversation_id.to_string(),
            stage: pipeline.stage,
            artifacts,
            events,
        })
    }

    /// Stop every agent listener
    pub fn shutdown(&mut self) {
        for handle in self.agents.drain(..) {
            handle.abort();
        }
        self.watcher = None;
        tracing::info!("Swarm stopped");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for handle in &self.agents {
            handle.abort();
        }
    }
}
