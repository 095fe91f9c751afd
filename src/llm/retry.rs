//! Retry with exponential backoff for model API requests.

use rand::Rng;
use std::time::Duration;

/// Failure of a single model API request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("rate limited by the model API")]
    RateLimited { retry_after_ms: Option<u64> },
    #[error("model API server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("model API rejected the request ({status}): {message}")]
    Client { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("model API request timed out")]
    Timeout,
}

impl ApiError {
    /// Classify a non-success HTTP status and its body.
    pub fn from_status(status: u16, retry_after_ms: Option<u64>, message: String) -> Self {
        match status {
            429 => Self::RateLimited { retry_after_ms },
            500..=599 => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }

    fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Configuration for retry behavior on transient API errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between retries.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }
}

/// Returns `true` if the error is transient and the request should be retried.
pub fn is_retryable(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::RateLimited { .. }
            | ApiError::Server { .. }
            | ApiError::Network(_)
            | ApiError::Timeout
    )
}

/// Delay before retry number `attempt` (0-based).
///
/// A server-provided `Retry-After` wins (clamped to `max_delay_ms`).
/// Otherwise `initial_delay_ms * backoff_factor^attempt` with ±25% jitter,
/// clamped to `max_delay_ms`.
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn calculate_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> u64 {
    if let Some(server_delay) = retry_after_ms {
        return server_delay.min(config.max_delay_ms);
    }

    let base = config.initial_delay_ms as f64 * config.backoff_factor.powi(attempt as i32);
    let clamped = base.min(config.max_delay_ms as f64);

    let jitter_factor = rand::rng().random_range(0.75..=1.25);
    let jittered = clamped * jitter_factor;

    (jittered as u64).min(config.max_delay_ms)
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries && is_retryable(&e) => {
                let delay = calculate_delay(config, attempt, e.retry_after_ms());
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay,
                    error = %e,
                    "Transient model API failure, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_config_values() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn classifies_status_codes() {
        assert!(matches!(
            ApiError::from_status(429, Some(500), String::new()),
            ApiError::RateLimited { retry_after_ms: Some(500) }
        ));
        assert!(matches!(
            ApiError::from_status(503, None, "busy".into()),
            ApiError::Server { status: 503, .. }
        ));
        assert!(matches!(
            ApiError::from_status(401, None, "bad key".into()),
            ApiError::Client { status: 401, .. }
        ));
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!is_retryable(&ApiError::Client {
            status: 400,
            message: "bad input".into(),
        }));
        assert!(is_retryable(&ApiError::Timeout));
        assert!(is_retryable(&ApiError::Network("connection refused".into())));
    }

    #[test]
    fn calculate_delay_exponential() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        };

        let delay0 = calculate_delay(&config, 0, None);
        assert!((750..=1250).contains(&delay0), "delay0={delay0}");

        let delay2 = calculate_delay(&config, 2, None);
        assert!((3000..=5000).contains(&delay2), "delay2={delay2}");
    }

    #[test]
    fn calculate_delay_respects_retry_after() {
        let config = RetryConfig::default();
        assert_eq!(calculate_delay(&config, 0, Some(5000)), 5000);
        assert_eq!(calculate_delay(&config, 0, Some(120_000)), 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_up_to_limit() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result: Result<(), ApiError> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::Timeout) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_permanent_failure() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result: Result<(), ApiError> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ApiError::Client {
                    status: 401,
                    message: "invalid key".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Client { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result = with_retry(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ApiError::Server {
                        status: 502,
                        message: "bad gateway".into(),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }
}
