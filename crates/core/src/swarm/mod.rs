//! # Swarm Orchestration
//!
//! The agent coordination kernel: event monitors, decision loops, action
//! executors, and the pipeline topology that connects them over the bus.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Input → Interviewer ⟷ EndUser ─┐
//!                                 ├─ user_requirements_list ─▶ DeployerInterviewer ⟷ Deployer
//!                                 │                                   │
//!                                 └───────────┬── operating_environment_list
//!                                             ▼
//!                                  Analyst (join) → Archivist (join) → Reviewer
//! ```

pub mod action;
pub mod agent;
pub mod coordinator;
pub mod events;
pub mod monitor;
pub mod pipeline;
pub mod thinking;

pub use action::{
    Action, ActionContext, ActionRegistry, ActionSet, Decision, DecisionSource, ExecutionResult,
    ExecutionStatus, Services,
};
pub use agent::{spawn, Agent, AgentHandle};
pub use coordinator::{Coordinator, OracleFactory, RunSummary};
pub use events::{SwarmEvent, SwarmEventKind};
pub use monitor::{DedupWindow, Monitor, MonitorOutcome, PendingArtifactSet};
pub use pipeline::{AgentRole, Pipeline, PipelineStage, PipelineTopology, RoleSpec, TriggerRule};
pub use thinking::{DecisionLoop, LoopOutcome, LoopState, RoleBehavior};
