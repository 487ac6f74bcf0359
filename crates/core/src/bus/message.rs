//! # Bus Messages
//!
//! The immutable envelope exchanged between agents, plus the artifact
//! references carried by `artifact_events` announcements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of message on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Raw stakeholder input that starts a conversation
    Input,
    /// A question from an interviewer
    Question,
    /// An answer to a question
    Response,
    /// Announcement that an artifact is available in the store
    ArtifactEvent,
    /// Composite trigger synthesized by a join monitor
    Trigger,
}

/// Pipeline deliverables announced on `artifact_events`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    UserRequirementsList,
    OperatingEnvironmentList,
    SystemRequirementsList,
    RequirementsModel,
    SoftwareRequirementsSpecification,
    ReviewedSpecification,
}

impl ArtifactKind {
    pub fn all() -> [ArtifactKind; 6] {
        [
            ArtifactKind::UserRequirementsList,
            ArtifactKind::OperatingEnvironmentList,
            ArtifactKind::SystemRequirementsList,
            ArtifactKind::RequirementsModel,
            ArtifactKind::SoftwareRequirementsSpecification,
            ArtifactKind::ReviewedSpecification,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::UserRequirementsList => "user_requirements_list",
            ArtifactKind::OperatingEnvironmentList => "operating_environment_list",
            ArtifactKind::SystemRequirementsList => "system_requirements_list",
            ArtifactKind::RequirementsModel => "requirements_model",
            ArtifactKind::SoftwareRequirementsSpecification => {
                "software_requirements_specification"
            }
            ArtifactKind::ReviewedSpecification => "reviewed_specification",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an announced artifact lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    #[serde(rename = "artifact_type")]
    pub kind: ArtifactKind,
    pub bucket: String,
    #[serde(rename = "artifact_key")]
    pub key: String,
}

impl ArtifactRef {
    pub fn new(kind: ArtifactKind, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind,
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// What a monitor matches a message against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Kind(MessageKind),
    Artifact(ArtifactKind),
}

/// A message on the bus. Never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (dedup key)
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Role of the sender
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub state: String,
    pub sent_from: String,
    pub sent_to: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    /// Artifacts referenced by announcements and composite triggers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
}

impl Message {
    /// Create a message with a fresh random ID
    pub fn new(kind: MessageKind, conversation_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            role: String::new(),
            content: String::new(),
            state: "sent".to_string(),
            sent_from: String::new(),
            sent_to: String::new(),
            conversation_id: conversation_id.into(),
            timestamp: Utc::now(),
            artifacts: Vec::new(),
        }
    }

    /// Announcement of a stored artifact. The ID is supplied by the caller so
    /// that re-announcing the same artifact is absorbed by downstream dedup.
    pub fn announcement(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        artifact: ArtifactRef,
    ) -> Self {
        let mut message = Self::new(MessageKind::ArtifactEvent, conversation_id);
        message.id = id.into();
        message.content = artifact.key.clone();
        message.artifacts.push(artifact);
        message
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn from(mut self, sender: &str) -> Self {
        self.role = sender.to_string();
        self.sent_from = sender.to_string();
        self
    }

    pub fn to(mut self, recipient: &str) -> Self {
        self.sent_to = recipient.to_string();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactRef>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// The artifact announced by an `ArtifactEvent`
    pub fn announced(&self) -> Option<&ArtifactRef> {
        match self.kind {
            MessageKind::ArtifactEvent => self.artifacts.first(),
            _ => None,
        }
    }

    /// First referenced artifact of the given kind
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactRef> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    /// Announcements are matched by artifact type, everything else by message type.
    pub fn interest(&self) -> Interest {
        match self.announced() {
            Some(artifact) => Interest::Artifact(artifact.kind),
            None => Interest::Kind(self.kind),
        }
    }
}
