//! Bulkops core
//!
//! Domain models, static business rules and the pure validation and matching
//! logic shared by the bulk move, bulk edit and import workflows.

pub mod error;
pub mod import;
pub mod models;
pub mod rules;
pub mod selection;
pub mod storage;

pub use error::{Error, Result};
pub use rules::RuleEnforcer;
pub use selection::classify_selection;
