//! Bulkops Engine Library
//!
//! Workflow orchestration for bulk move, bulk edit and import: step
//! tracking, issue type and field resolution, payload building and task
//! polling. Exposed as a library for the CLI and for testing.

pub mod config;
pub mod controller;
pub mod event_manager;
pub mod events;
pub mod fields;
pub mod generation;
pub mod import;
pub mod mapping;
pub mod orchestrator;
pub mod payload;
pub mod retry;
pub mod selection;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use config::ConfigManager;
pub use controller::{BulkEditController, BulkMoveController, ControllerError};
pub use event_manager::EventManager;
pub use events::{BulkOpsEvent, MappingEvent, TaskEvent, WorkflowEvent};
pub use fields::TargetFieldResolver;
pub use generation::{Debouncer, Generation, GenerationTracker};
pub use import::ImportSession;
pub use mapping::{IssueTypeMapping, IssueTypeMappingResolver};
pub use orchestrator::{BulkRequest, PollHandle, TaskOrchestrator, TaskPhase};
pub use workflow::StepWorkflowModel;
