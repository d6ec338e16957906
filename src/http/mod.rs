
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Build a blocking agent with a global request timeout
#[inline]
pub fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Whether a failed request is worth another attempt
#[inline]
pub fn is_retryable(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

/// Run `request_fn` up to `attempts` times
///
/// Server errors and transport failures are retried with exponential backoff
/// (1s, 2s, 4s, ...). Client errors fail on the first attempt.
#[inline]
pub fn request_with_retry<F>(target: &str, attempts: u32, request_fn: F) -> Result<String>
where
    F: FnMut() -> Result<String, ureq::Error>,
{
    request_with_backoff(target, attempts, Duration::from_secs(1), request_fn)
}

pub(crate) fn request_with_backoff<F>(
    target: &str,
    attempts: u32,
    base_delay: Duration,
    mut request_fn: F,
) -> Result<String>
where
    F: FnMut() -> Result<String, ureq::Error>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        debug!("HTTP request attempt {}/{} to {}", attempt, attempts, target);

        match request_fn() {
            Ok(response_text) => {
                debug!("Request succeeded on attempt {}", attempt);
                return Ok(response_text);
            }
            Err(error) => {
                if let ureq::Error::StatusCode(status) = &error {
                    if *status < 500 {
                        warn!("Client error (status {}), not retrying", status);
                        return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                    }
                }

                if !is_retryable(&error) {
                    warn!("Non-retryable error: {}", error);
                    return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                }

                warn!(
                    "Request error: {}, attempt {}/{}",
                    error, attempt, attempts
                );
                last_error = Some(anyhow::anyhow!("Request error: {}", error));

                if attempt < attempts {
                    let factor = EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt - 1);
                    let delay = base_delay.saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX));
                    debug!("Waiting {:?} before retry", delay);
                    std::thread::sleep(delay);
                }
            }
        }
    }

    error!("All retry attempts failed for request to {}", target);

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
}
