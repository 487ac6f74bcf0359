pub mod checklist;
pub mod record;

pub use checklist::{CriteriaChecklist, Criterion, CriterionEvaluation, DeploymentState};
pub use record::{Channel, Speaker};
