//! Bounded fixed-delay retry of transient gateway failures

use bulkops_jira::Result;
use std::future::Future;
use std::time::Duration;

/// Runs `op`, retrying up to `limit` more times while it fails transiently
pub async fn retry_transient<T, F, Fut>(limit: u32, delay: Duration, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < limit => {
                attempt += 1;
                tracing::warn!("{} failed ({}), retry {}/{} in {:?}", what, e, attempt, limit, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!("{} failed after {} retries: {}", what, attempt, e);
                }
                return Err(e);
            }
        }
    }
}
