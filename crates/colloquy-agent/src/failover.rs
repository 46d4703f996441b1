use crate::gateway::CompletionGateway;
use async_trait::async_trait;
use colloquy_core::{CompletionError, Turn};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Future returned by the injectable sleep function used in tests.
#[cfg(test)]
type SleepFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<dyn Fn(u64) -> SleepFuture + Send + Sync>;

/// Configures retry behaviour for failover across completion gateways.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries per gateway before moving to the next one.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Computes the backoff delay for a given attempt using exponential backoff
/// capped at `backoff_max_ms`.
fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy.backoff_base_ms.saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// A `CompletionGateway` that wraps several gateways and performs automatic
/// failover with exponential-backoff retries.
///
/// For each request it tries gateways in order. Within each gateway it
/// retries up to `max_retries` times for transient errors (see
/// [`CompletionError::is_retryable`]). A non-retryable error, or exhausted
/// retries, moves on to the next gateway. If every gateway fails, the last
/// error is returned.
pub struct FailoverGateway {
    gateways: Vec<Box<dyn CompletionGateway>>,
    policy: RetryPolicy,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl FailoverGateway {
    /// Create a new failover gateway with the given gateways and retry policy.
    ///
    /// An empty list yields a gateway that always fails with a transport
    /// error.
    pub fn new(gateways: Vec<Box<dyn CompletionGateway>>, policy: RetryPolicy) -> Self {
        Self {
            gateways,
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    /// Perform a sleep for the given duration in milliseconds.
    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl CompletionGateway for FailoverGateway {
    async fn complete(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, CompletionError> {
        let mut last_err: Option<CompletionError> = None;

        for (gateway_idx, gateway) in self.gateways.iter().enumerate() {
            for attempt in 0..=self.policy.max_retries {
                match gateway.complete(system_prompt, turns).await {
                    Ok(reply) => return Ok(reply),
                    Err(e) => {
                        if !e.is_retryable() {
                            warn!(
                                gateway = gateway_idx,
                                attempt,
                                error = %e,
                                "Non-retryable error, moving to next gateway"
                            );
                            last_err = Some(e);
                            break;
                        }

                        if attempt < self.policy.max_retries {
                            let delay = compute_backoff(&self.policy, attempt);
                            info!(
                                gateway = gateway_idx,
                                attempt,
                                delay_ms = delay,
                                error = %e,
                                "Retryable error, backing off"
                            );
                            self.do_sleep(delay).await;
                        }
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| CompletionError::transport("no completion gateways configured")))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
