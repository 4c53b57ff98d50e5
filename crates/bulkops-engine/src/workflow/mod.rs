pub mod model;

pub use model::{StepWorkflowModel, WorkflowError};
