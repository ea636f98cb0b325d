use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("matchday-orchestrator/", env!("CARGO_PKG_VERSION"));
const MAX_RETRY_AFTER_SECS: u64 = 60;

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build http client")
    })
}

/// Fixed exponential backoff: `base_delay * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0 = first retry).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Seconds-form `Retry-After`, honoured only when `0 < d <= 60s`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    if secs == 0 || secs > MAX_RETRY_AFTER_SECS {
        return None;
    }
    Some(Duration::from_secs(secs))
}

/// Sends the request built by `build`, retrying transport errors and
/// retryable statuses. Non-success responses that are not retried come back
/// as errors carrying a body snippet.
pub fn send_with_retry<F>(label: &str, policy: &RetryPolicy, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        let is_last = attempt + 1 == attempts;
        match build().send() {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                if is_retryable_status(status) && !is_last {
                    let delay = parse_retry_after(resp.headers())
                        .unwrap_or_else(|| policy.backoff_delay(attempt));
                    warn!(%label, %status, attempt = attempt + 1, ?delay, "retrying request");
                    thread::sleep(delay);
                    continue;
                }
                let body = resp.text().unwrap_or_default();
                return Err(anyhow!("{label}: http {status}: {}", snippet(&body)));
            }
            Err(err) => {
                if is_last || !(err.is_timeout() || err.is_connect() || err.is_request()) {
                    return Err(err).with_context(|| format!("{label}: request failed"));
                }
                let delay = policy.backoff_delay(attempt);
                debug!(
                    %label,
                    error = %err,
                    attempt = attempt + 1,
                    ?delay,
                    "transport error, retrying"
                );
                last_err = Some(err);
                thread::sleep(delay);
            }
        }
    }

    match last_err {
        Some(err) => Err(err).with_context(|| format!("{label}: retries exhausted")),
        None => Err(anyhow!("{label}: retries exhausted")),
    }
}

pub fn snippet(body: &str) -> String {
    body.trim()
        .replace(['\n', '\r'], " ")
        .chars()
        .take(220)
        .collect()
}
