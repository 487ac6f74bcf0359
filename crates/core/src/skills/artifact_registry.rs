//! # Artifact Registry
//!
//! Naming and publication of pipeline deliverables. Keys are derived from
//! the artifact kind, the conversation and a digest of the inputs, so a
//! retried generation overwrites the same blob and re-announces it under the
//! same message ID, which downstream dedup absorbs.

use sha2::{Digest, Sha256};

use crate::bus::{ArtifactKind, ArtifactRef, Message, ARTIFACT_EVENTS};
use crate::swarm::action::{ActionContext, ExecutionResult};
use crate::swarm::events::{SwarmEvent, SwarmEventKind};

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// `<conversation>/<kind>-<digest16>.md`
pub fn artifact_key(kind: ArtifactKind, conversation_id: &str, inputs: &[&str]) -> String {
    let digest = digest(inputs);
    format!("{}/{}-{}.md", conversation_id, kind.as_str(), &digest[..16])
}

/// Message ID of the announcement for a stored artifact
pub fn announcement_id(artifact: &ArtifactRef) -> String {
    let digest = digest(&[artifact.bucket.as_str(), artifact.key.as_str()]);
    format!("artifact-{}", &digest[..32])
}

/// Why a store-and-announce failed, as an action error reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFailure {
    Storage,
    Bus,
}

impl PublishFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            PublishFailure::Storage => "storage_failure",
            PublishFailure::Bus => "publish_failure",
        }
    }

    pub fn into_result(self, action: &str) -> ExecutionResult {
        ExecutionResult::error(action, self.reason())
    }
}

/// Write `content` under a deterministic key and announce it on `artifact_events`
pub async fn store_and_announce(
    ctx: &ActionContext<'_>,
    kind: ArtifactKind,
    content: &str,
    inputs: &[&str],
) -> Result<ArtifactRef, PublishFailure> {
    let services = ctx.services;
    let conversation_id = ctx.conversation_id();
    let bucket = services.buckets.artifacts.clone();
    let key = artifact_key(kind, conversation_id, inputs);

    services
        .store
        .put(&bucket, &key, content.as_bytes().to_vec())
        .await
        .map_err(|e| {
            tracing::warn!(role = %services.role, %key, error = %e, "Failed to store artifact");
            PublishFailure::Storage
        })?;

    let artifact = ArtifactRef::new(kind, bucket, key);
    let announcement = Message::announcement(announcement_id(&artifact), conversation_id, artifact.clone())
        .from(services.role.as_str())
        .to(ARTIFACT_EVENTS);

    services
        .bus
        .publish(ARTIFACT_EVENTS, announcement)
        .await
        .map_err(|e| {
            tracing::warn!(role = %services.role, key = %artifact.key, error = %e, "Failed to announce artifact");
            PublishFailure::Bus
        })?;

    tracing::info!(role = %services.role, kind = %kind, key = %artifact.key, "Artifact published");
    services
        .emit(
            SwarmEvent::new(SwarmEventKind::ArtifactPublished, services.role.as_str())
                .with_conversation(conversation_id)
                .with_data(serde_json::json!({ "artifact_type": kind, "artifact_key": artifact.key })),
        )
        .await;

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        let a = artifact_key(ArtifactKind::UserRequirementsList, "conv-1", &["transcript"]);
        let b = artifact_key(ArtifactKind::UserRequirementsList, "conv-1", &["transcript"]);
        let c = artifact_key(ArtifactKind::UserRequirementsList, "conv-1", &["transcript v2"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("conv-1/user_requirements_list-"));
        assert!(a.ends_with(".md"));
    }

    #[test]
    fn test_input_boundaries_matter() {
        let a = artifact_key(ArtifactKind::RequirementsModel, "c", &["ab", "c"]);
        let b = artifact_key(ArtifactKind::RequirementsModel, "c", &["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_announcement_id_follows_key() {
        let artifact = ArtifactRef::new(ArtifactKind::RequirementsModel, "b", "conv/k.md");
        assert_eq!(announcement_id(&artifact), announcement_id(&artifact.clone()));
        assert_ne!(
            announcement_id(&artifact),
            announcement_id(&ArtifactRef::new(ArtifactKind::RequirementsModel, "b", "conv/j.md"))
        );
    }
}
