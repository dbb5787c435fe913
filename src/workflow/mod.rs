//! Run orchestration

pub mod channel_worker;
pub mod maintenance;
pub mod orchestrator;

pub use orchestrator::{Orchestrator, RunMode, RunReport};
