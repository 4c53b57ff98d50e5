//! Configuration manager

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use bulkops_core::{
    models::{BulkOperationRules, Config, TaskConfig},
    storage::{init_config_dir, ConfigStorage},
    Result as CoreResult,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] bulkops_core::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigManagerError>;

/// Loaded configuration plus the file it persists to
pub struct ConfigManager {
    storage: ConfigStorage,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    pub fn new() -> CoreResult<Self> {
        let config_dir = init_config_dir()?;
        let storage = ConfigStorage::new(config_dir);

        // Missing or empty files load as defaults
        let config = storage.load()?;

        Ok(Self {
            storage,
            config: Arc::new(RwLock::new(config)),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.storage.path()
    }

    pub async fn get(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn update(&self, config: Config) -> Result<Config> {
        config
            .validate()
            .map_err(|e| ConfigManagerError::Invalid(e.to_string()))?;

        self.storage.save(&config)?;

        {
            let mut current = self.config.write().await;
            *current = config.clone();
        }
        tracing::debug!("Configuration saved to {}", self.storage.path().display());

        Ok(config)
    }

    pub async fn set_jira(&self, base_url: Option<String>, username: Option<String>) -> Result<Config> {
        let mut config = self.get().await;

        if let Some(url) = base_url {
            config.jira.base_url = Some(url.trim_end_matches('/').to_string());
        }

        if let Some(name) = username {
            config.jira.username = Some(name);
        }

        self.update(config).await
    }

    pub async fn update_rules(&self, rules: BulkOperationRules) -> Result<Config> {
        let mut config = self.get().await;
        config.rules = rules;
        self.update(config).await
    }

    pub async fn update_task_config(
        &self,
        poll_interval_ms: Option<u64>,
        submit_retry_limit: Option<u32>,
        submit_retry_delay_ms: Option<u64>,
    ) -> Result<Config> {
        let mut config = self.get().await;
        let TaskConfig {
            poll_interval_ms: poll,
            submit_retry_limit: limit,
            submit_retry_delay_ms: delay,
            ..
        } = &mut config.tasks;

        if let Some(interval) = poll_interval_ms {
            *poll = interval;
        }

        if let Some(retries) = submit_retry_limit {
            *limit = retries;
        }

        if let Some(retry_delay) = submit_retry_delay_ms {
            *delay = retry_delay;
        }

        self.update(config).await
    }

    pub async fn set_log_level(&self, log_level: &str) -> Result<Config> {
        let mut config = self.get().await;
        config.logging.log_level = log_level.to_string();
        self.update(config).await
    }

    pub async fn reset_to_default(&self) -> Result<Config> {
        let config = Config::default();
        self.update(config).await
    }
}
