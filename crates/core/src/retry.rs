use std::future::Future;
use std::time::Duration;

const DEFAULT_ATTEMPTS: u32 = 2;
const DEFAULT_BACKOFF_MS: u64 = 1000;

/// Bounded retry with exponential backoff for collaborator calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Reads `{prefix}_RETRIES` (total attempts) and `{prefix}_BACKOFF_MS`.
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        let attempts = std::env::var(format!("{prefix}_RETRIES"))
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.attempts)
            .max(1);
        let backoff = std::env::var(format!("{prefix}_BACKOFF_MS"))
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff);
        Self { attempts, backoff }
    }

    pub fn no_backoff(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    pub async fn run<T, F, Fut>(&self, what: &'static str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= self.attempts {
                        return Err(err);
                    }
                    let backoff = self.backoff.saturating_mul(1 << (attempt - 1).min(16));
                    tracing::warn!(what, attempt, ?backoff, error = %err, "call failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
