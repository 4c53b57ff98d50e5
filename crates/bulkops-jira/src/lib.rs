//! Bulkops Jira integration
//!
//! The gateway seam between the bulk operation engine and the Jira Cloud REST
//! API: wire types, the bulk request payloads and a reqwest backed client.

pub mod auth;
pub mod bulk;
pub mod client;
pub mod error;
pub mod gateway;
pub mod types;

pub use auth::JiraAuth;
pub use bulk::{
    BulkEditRequest, BulkMoveRequest, EditedFieldsInput, TargetMandatoryFields,
    TargetToSourcesMapping,
};
pub use client::JiraClient;
pub use error::{GatewayError, Result};
pub use gateway::{collect_issues, IssuePage, JiraGateway, ParsedQuery};
