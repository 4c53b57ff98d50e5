//! Jira authentication

use crate::error::{GatewayError, Result};
use tracing::debug;

pub const TOKEN_ENV_VAR: &str = "BULKOPS_API_TOKEN";
const KEYRING_SERVICE: &str = "bulkops";

pub struct JiraAuth {
    username: String,
    api_token: String,
}

impl JiraAuth {
    pub fn new(username: String, api_token: String) -> Self {
        Self {
            username,
            api_token,
        }
    }

    /// Resolves the API token from the environment, then the OS keyring
    pub fn resolve(username: &str) -> Result<Self> {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                debug!("Using API token from {}", TOKEN_ENV_VAR);
                return Ok(Self::new(username.to_string(), token));
            }
        }

        let entry = keyring::Entry::new(KEYRING_SERVICE, username)?;
        match entry.get_password() {
            Ok(token) => Ok(Self::new(username.to_string(), token)),
            Err(keyring::Error::NoEntry) => Err(GatewayError::Auth(format!(
                "No API token for {}; set {} or store one in the keyring",
                username, TOKEN_ENV_VAR
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores the token in the OS keyring for later runs
    pub fn store(&self) -> Result<()> {
        keyring::Entry::new(KEYRING_SERVICE, &self.username)?.set_password(&self.api_token)?;
        Ok(())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn to_basic_auth(&self) -> String {
        use base64::Engine;
        let credentials = format!("{}:{}", self.username, self.api_token);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }
}
