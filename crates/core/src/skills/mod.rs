//! # Role Skills
//!
//! One module per pipeline role. Each declares the role's closed action set,
//! registers a handler for every action, and supplies the [`RoleBehavior`]
//! that plugs the role into the generic decision loop.
//!
//! | Role | Trigger | Terminal output |
//! |------|---------|-----------------|
//! | Interviewer | human input, end-user responses | user requirements list |
//! | EndUser | interviewer questions | response |
//! | DeployerInterviewer | user requirements list, deployer responses | operating environment list |
//! | Deployer | deployment questions | response |
//! | Analyst | join: user requirements + operating environment | system requirements, requirement model |
//! | Archivist | join: system requirements + requirement model | software requirements specification |
//! | Reviewer | software requirements specification | reviewed specification |
//!
//! [`RoleBehavior`]: crate::swarm::thinking::RoleBehavior

pub mod analyst;
pub mod archivist;
pub mod artifact_registry;
pub mod deployer;
pub mod enduser;
pub mod interviewer;
pub mod prompts;
pub mod reviewer;

pub use analyst::AnalystAction;
pub use archivist::ArchivistAction;
pub use deployer::{DeployerAction, DeploymentInterviewAction};
pub use enduser::EndUserAction;
pub use interviewer::InterviewerAction;
pub use reviewer::ReviewerAction;
