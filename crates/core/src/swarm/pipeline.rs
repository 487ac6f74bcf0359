//! # Pipeline Topology
//!
//! The static graph of agent roles: which topics each role listens on, which
//! messages or artifacts trigger it, what it may do, and how its dialogue is
//! capped. Also the stage tracker the coordinator advances as artifacts appear.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::action::ActionSet;
use crate::bus::{ArtifactKind, Interest, MessageKind, ARTIFACT_EVENTS};
use crate::config::PipelineConfig;
use crate::error::TopologyError;
use crate::skills::{analyst, archivist, deployer, enduser, interviewer, reviewer};

/// Human input to the interviewer
pub const USER_INTERVIEWER: &str = "user_interviewer";
pub const INTERVIEWER_ENDUSER: &str = "interviewer_enduser";
pub const ENDUSER_INTERVIEWER: &str = "enduser_interviewer";
pub const INTERVIEWER_DEPLOYER: &str = "interviewer_deployer";
pub const DEPLOYER_INTERVIEWER: &str = "deployer_interviewer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Interviewer,
    EndUser,
    DeployerInterviewer,
    Deployer,
    Analyst,
    Archivist,
    Reviewer,
}

impl AgentRole {
    pub fn all() -> [AgentRole; 7] {
        [
            AgentRole::Interviewer,
            AgentRole::EndUser,
            AgentRole::DeployerInterviewer,
            AgentRole::Deployer,
            AgentRole::Analyst,
            AgentRole::Archivist,
            AgentRole::Reviewer,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Interviewer => "interviewer",
            AgentRole::EndUser => "end_user",
            AgentRole::DeployerInterviewer => "deployer_interviewer",
            AgentRole::Deployer => "deployer",
            AgentRole::Analyst => "analyst",
            AgentRole::Archivist => "archivist",
            AgentRole::Reviewer => "reviewer",
        }
    }

    pub fn parse(name: &str) -> Result<AgentRole, TopologyError> {
        AgentRole::all()
            .into_iter()
            .find(|r| r.as_str() == name.trim())
            .ok_or_else(|| TopologyError::UnknownRole(name.to_string()))
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a monitor hands work to the decision loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerRule {
    /// Every relevant message triggers
    Direct,
    /// Trigger once every listed artifact type has been announced
    Join(Vec<ArtifactKind>),
}

/// One row of the topology
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSpec {
    pub role: AgentRole,
    pub topics: Vec<&'static str>,
    pub interests: Vec<Interest>,
    pub trigger: TriggerRule,
    pub allowed_actions: Vec<&'static str>,
    pub default_action: Option<&'static str>,
    pub turn_cap: Option<u32>,
}

impl RoleSpec {
    pub fn is_join(&self) -> bool {
        matches!(self.trigger, TriggerRule::Join(_))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineTopology {
    roles: Vec<RoleSpec>,
}

impl PipelineTopology {
    /// Interviewer ⟷ EndUser, Interviewer ⟷ Deployer, Analyst, Archivist, Reviewer
    pub fn reference(config: &PipelineConfig) -> Self {
        let roles = vec![
            RoleSpec {
                role: AgentRole::Interviewer,
                topics: vec![USER_INTERVIEWER, ENDUSER_INTERVIEWER],
                interests: vec![
                    Interest::Kind(MessageKind::Input),
                    Interest::Kind(MessageKind::Response),
                ],
                trigger: TriggerRule::Direct,
                allowed_actions: interviewer::InterviewerAction::names(),
                default_action: Some(interviewer::InterviewerAction::AskQuestion.name()),
                turn_cap: Some(config.enduser_turn_cap),
            },
            RoleSpec {
                role: AgentRole::EndUser,
                topics: vec![INTERVIEWER_ENDUSER],
                interests: vec![Interest::Kind(MessageKind::Question)],
                trigger: TriggerRule::Direct,
                allowed_actions: enduser::EndUserAction::names(),
                default_action: Some(enduser::EndUserAction::Respond.name()),
                turn_cap: None,
            },
            RoleSpec {
                role: AgentRole::DeployerInterviewer,
                topics: vec![ARTIFACT_EVENTS, DEPLOYER_INTERVIEWER],
                interests: vec![
                    Interest::Artifact(ArtifactKind::UserRequirementsList),
                    Interest::Kind(MessageKind::Response),
                ],
                trigger: TriggerRule::Direct,
                allowed_actions: deployer::DeploymentInterviewAction::names(),
                default_action: Some(deployer::DeploymentInterviewAction::AskDeployer.name()),
                turn_cap: Some(config.deployer_turn_cap),
            },
            RoleSpec {
                role: AgentRole::Deployer,
                topics: vec![INTERVIEWER_DEPLOYER],
                interests: vec![Interest::Kind(MessageKind::Question)],
                trigger: TriggerRule::Direct,
                allowed_actions: deployer::DeployerAction::names(),
                default_action: Some(deployer::DeployerAction::Respond.name()),
                turn_cap: None,
            },
            join_spec(
                AgentRole::Analyst,
                vec![
                    ArtifactKind::UserRequirementsList,
                    ArtifactKind::OperatingEnvironmentList,
                ],
                analyst::AnalystAction::names(),
                None,
            ),
            join_spec(
                AgentRole::Archivist,
                vec![
                    ArtifactKind::SystemRequirementsList,
                    ArtifactKind::RequirementsModel,
                ],
                archivist::ArchivistAction::names(),
                Some(archivist::ArchivistAction::GenerateSpecification.name()),
            ),
            RoleSpec {
                role: AgentRole::Reviewer,
                topics: vec![ARTIFACT_EVENTS],
                interests: vec![Interest::Artifact(
                    ArtifactKind::SoftwareRequirementsSpecification,
                )],
                trigger: TriggerRule::Direct,
                allowed_actions: reviewer::ReviewerAction::names(),
                default_action: Some(reviewer::ReviewerAction::ReviewSpecification.name()),
                turn_cap: None,
            },
        ];
        Self { roles }
    }

    pub fn roles(&self) -> &[RoleSpec] {
        &self.roles
    }

    pub fn role(&self, role: AgentRole) -> Result<&RoleSpec, TopologyError> {
        self.roles
            .iter()
            .find(|spec| spec.role == role)
            .ok_or_else(|| TopologyError::UnknownRole(role.to_string()))
    }

    /// Roles triggered (directly or as part of a join) by an artifact type
    pub fn consumers_of(&self, kind: ArtifactKind) -> Vec<AgentRole> {
        self.roles
            .iter()
            .filter(|spec| spec.interests.contains(&Interest::Artifact(kind)))
            .map(|spec| spec.role)
            .collect()
    }

    /// Plain-text table for the CLI
    pub fn render(&self) -> String {
        let mut out = String::new();
        for spec in &self.roles {
            let trigger = match &spec.trigger {
                TriggerRule::Direct => "direct".to_string(),
                TriggerRule::Join(kinds) => format!(
                    "join({})",
                    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(" + ")
                ),
            };
            out.push_str(&format!(
                "{:<22} topics=[{}] trigger={} actions=[{}] default={} cap={}\n",
                spec.role.as_str(),
                spec.topics.join(", "),
                trigger,
                spec.allowed_actions.join(", "),
                spec.default_action.unwrap_or("-"),
                spec.turn_cap.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            ));
        }
        out.push('\n');
        for kind in ArtifactKind::all() {
            let consumers: Vec<&str> = self.consumers_of(kind).iter().map(|r| r.as_str()).collect();
            let consumers = if consumers.is_empty() {
                "(final)".to_string()
            } else {
                consumers.join(", ")
            };
            out.push_str(&format!("{:<36} -> {}\n", kind.as_str(), consumers));
        }
        out
    }
}

fn join_spec(
    role: AgentRole,
    kinds: Vec<ArtifactKind>,
    allowed_actions: Vec<&'static str>,
    default_action: Option<&'static str>,
) -> RoleSpec {
    RoleSpec {
        role,
        topics: vec![ARTIFACT_EVENTS],
        interests: kinds.iter().copied().map(Interest::Artifact).collect(),
        trigger: TriggerRule::Join(kinds),
        allowed_actions,
        default_action,
        turn_cap: None,
    }
}

/// Stage of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Interviewer ⟷ EndUser dialogue
    Interviewing,
    /// Interviewer ⟷ Deployer criteria checklist
    DeploymentInterview,
    /// Analyst producing system requirements and the requirement model
    Analysis,
    /// Archivist assembling the specification
    Archiving,
    /// Reviewer checking the specification
    Reviewing,
    Complete,
    Failed,
}

/// The pipeline state machine, advanced by artifact announcements
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stage: PipelineStage,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Interviewing,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance for an announced artifact. Stages never move backwards.
    pub fn observe(&mut self, kind: ArtifactKind) -> PipelineStage {
        let next = match kind {
            ArtifactKind::UserRequirementsList => PipelineStage::DeploymentInterview,
            ArtifactKind::OperatingEnvironmentList => PipelineStage::Analysis,
            ArtifactKind::SystemRequirementsList => PipelineStage::Analysis,
            ArtifactKind::RequirementsModel => PipelineStage::Archiving,
            ArtifactKind::SoftwareRequirementsSpecification => PipelineStage::Reviewing,
            ArtifactKind::ReviewedSpecification => PipelineStage::Complete,
        };
        if !self.is_complete() && rank(next) > rank(self.stage) {
            self.stage = next;
        }
        self.stage
    }

    pub fn fail(&mut self) {
        self.stage = PipelineStage::Failed;
    }

    /// Check if pipeline is complete
    pub fn is_complete(&self) -> bool {
        matches!(self.stage, PipelineStage::Complete | PipelineStage::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}

fn rank(stage: PipelineStage) -> u8 {
    match stage {
        PipelineStage::Interviewing => 0,
        PipelineStage::DeploymentInterview => 1,
        PipelineStage::Analysis => 2,
        PipelineStage::Archiving => 3,
        PipelineStage::Reviewing => 4,
        PipelineStage::Complete => 5,
        PipelineStage::Failed => 6,
    }
}
