//! # Specforge Core
//!
//! Agent coordination kernel for requirements elicitation: role agents talk
//! over a topic bus, decide their next step through an oracle, and hand
//! work to each other by announcing stored artifacts.
//!
//! ## Architecture
//!
//! - `bus/` - Messages, artifact announcements, publish/subscribe
//! - `store/` - Bucketed artifact storage (in-memory, SQLite)
//! - `oracle/` - Decision oracle (radkit LLM functions, scripted)
//! - `swarm/` - Monitor, decision loop, action executor, topology, coordinator
//! - `skills/` - One module per role: actions, handlers, behavior
//! - `state/` - Dialogue transcripts and the deployment criteria checklist
//!
//! ## Usage
//!
//! ```rust,ignore
//! use specforge_core::config::PipelineConfig;
//! use specforge_core::swarm::Coordinator;
//!
//! let mut coordinator = Coordinator::new(PipelineConfig::default(), store, bus);
//! let summary = coordinator.run("An app to book community sports halls").await?;
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod models;
pub mod oracle;
pub mod skills;
pub mod state;
pub mod store;
pub mod swarm;
