//! # Deployment Criteria Checklist
//!
//! The deployment interview is gated on seven operating-environment criteria
//! (after ISO/IEC/IEEE 29148). Each deployer response is evaluated against
//! the criteria still unresolved; the interview ends once all are sufficient.
//!
//! The checklist lives in the store under the conversation ID, together with
//! the user requirements the interview is based on.

use serde::{Deserialize, Serialize};

use crate::bus::ArtifactRef;
use crate::error::StoreError;
use crate::store::{self, ArtifactStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub key: String,
    pub description: String,
    pub answered: bool,
    pub sufficient: bool,
}

impl Criterion {
    fn new(key: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            answered: false,
            sufficient: false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.answered && self.sufficient
    }
}

/// One evaluation of a criterion against a deployer response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub criteria_key: String,
    pub is_answered: bool,
    pub is_sufficient: bool,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaChecklist {
    criteria: Vec<Criterion>,
}

impl Default for CriteriaChecklist {
    fn default() -> Self {
        Self::deployment()
    }
}

impl CriteriaChecklist {
    /// The seven deployment criteria, all unresolved
    pub fn deployment() -> Self {
        Self {
            criteria: vec![
                Criterion::new(
                    "infrastructure",
                    "Hardware infrastructure (servers, network topology, load balancers)",
                ),
                Criterion::new(
                    "security",
                    "Security requirements (authentication, authorization, encryption, compliance)",
                ),
                Criterion::new(
                    "scalability",
                    "Scalability and performance constraints (concurrent users, response time)",
                ),
                Criterion::new(
                    "database",
                    "Database and data management (DBMS, backup, replication)",
                ),
                Criterion::new(
                    "deployment_process",
                    "Deployment and CI/CD pipeline (automation, versioning, rollback)",
                ),
                Criterion::new(
                    "monitoring",
                    "Monitoring and logging requirements (metrics, alerts, log retention)",
                ),
                Criterion::new(
                    "compliance",
                    "Regulatory and compliance requirements (GDPR, HIPAA, industry standards)",
                ),
            ],
        }
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn get(&self, key: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.key == key)
    }

    pub fn unresolved(&self) -> Vec<&Criterion> {
        self.criteria.iter().filter(|c| !c.is_resolved()).collect()
    }

    pub fn unresolved_keys(&self) -> Vec<String> {
        self.unresolved().iter().map(|c| c.key.clone()).collect()
    }

    pub fn sufficient_count(&self) -> usize {
        self.criteria.iter().filter(|c| c.is_resolved()).count()
    }

    /// Join condition of the deployment interview
    pub fn all_sufficient(&self) -> bool {
        self.criteria.iter().all(Criterion::is_resolved)
    }

    /// Apply evaluations to unresolved criteria only. Unknown keys and
    /// already-resolved criteria are left alone. Returns how many applied.
    pub fn apply(&mut self, evaluations: &[CriterionEvaluation]) -> usize {
        let mut applied = 0;
        for evaluation in evaluations {
            let Some(criterion) = self
                .criteria
                .iter_mut()
                .find(|c| c.key == evaluation.criteria_key.trim())
            else {
                tracing::debug!(key = %evaluation.criteria_key, "Ignoring unknown criterion");
                continue;
            };
            if criterion.is_resolved() {
                continue;
            }
            criterion.answered = evaluation.is_answered;
            criterion.sufficient = evaluation.is_answered && evaluation.is_sufficient;
            applied += 1;
        }
        applied
    }

    /// `- key: description [answered: .., sufficient: ..]` per criterion
    pub fn render(&self) -> String {
        self.criteria
            .iter()
            .map(|c| {
                format!(
                    "- {}: {} [answered: {}, sufficient: {}]",
                    c.key, c.description, c.answered, c.sufficient
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render_unresolved(&self) -> String {
        self.unresolved()
            .iter()
            .map(|c| format!("- {}: {}", c.key, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-conversation working state of the deployment interview
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub checklist: CriteriaChecklist,
    /// User requirements announced for this conversation
    #[serde(default)]
    pub user_requirements: Option<ArtifactRef>,
    /// Deployer responses evaluated so far
    #[serde(default)]
    pub evaluations: u32,
}

pub fn state_key(conversation_id: &str) -> String {
    format!("{}/deployment_criteria_state.json", conversation_id)
}

impl DeploymentState {
    /// Load, starting fresh when nothing is stored yet
    pub async fn load(
        store: &dyn ArtifactStore,
        bucket: &str,
        conversation_id: &str,
    ) -> Result<Self, StoreError> {
        let key = state_key(conversation_id);
        let text = store::read_text_or_empty(store, bucket, &key).await?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&text)
            .map_err(|e| StoreError::Backend(format!("corrupt deployment state {}: {}", key, e)))
    }

    pub async fn save(
        &self,
        store: &dyn ArtifactStore,
        bucket: &str,
        conversation_id: &str,
    ) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        store::write_text(store, bucket, &state_key(conversation_id), &text).await
    }
}
