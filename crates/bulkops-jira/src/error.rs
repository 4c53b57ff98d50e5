//! Error types for Jira integration

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// The request was understood and refused
    #[error("Jira rejected the request ({status}): {}", messages.join("; "))]
    Rejected { status: u16, messages: Vec<String> },

    #[error("Jira server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    /// Failures worth retrying after a delay
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GatewayError::Server { .. } => true,
            _ => false,
        }
    }

    /// Status code reported to callers of a failed submission
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Rejected { status, .. } | GatewayError::Server { status, .. } => *status,
            GatewayError::NotFound(_) => 404,
            GatewayError::Auth(_) => 401,
            _ => 500,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        match self {
            GatewayError::Rejected { messages, .. } => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let server = GatewayError::Server {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(server.is_transient());

        let rejected = GatewayError::Rejected {
            status: 400,
            messages: vec!["Invalid target".to_string()],
        };
        assert!(!rejected.is_transient());
        assert_eq!(rejected.status_code(), 400);
        assert_eq!(rejected.messages(), vec!["Invalid target"]);
        assert!(!GatewayError::NotFound("task".to_string()).is_transient());
    }
}
