//! Retry policies for provider calls.
//!
//! Image and voice calls retry transient failures and rate limits with
//! exponential backoff (`2^n` seconds, 3 retries). Other API calls retry
//! transient failures only, with linear backoff (`n` seconds, 2 retries).
//! Image calls also retry an empty result list. Anything else propagates
//! on the first failure.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Request, Response};
use storyreel_models::CancelToken;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

/// Delay growth between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^n` before retry `n`
    Exponential,
    /// `base * n` before retry `n`
    Linear,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Label for logs and metrics
    pub name: &'static str,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    /// Whether HTTP 429 is retried
    pub retry_rate_limits: bool,
    /// Whether an empty result list is retried
    pub retry_empty_responses: bool,
}

impl RetryPolicy {
    pub fn image() -> Self {
        Self {
            name: "image",
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Exponential,
            retry_rate_limits: true,
            retry_empty_responses: true,
        }
    }

    /// Same schedule as images, but an empty audio payload is final.
    pub fn voice() -> Self {
        Self {
            name: "voice",
            retry_empty_responses: false,
            ..Self::image()
        }
    }

    pub fn general() -> Self {
        Self {
            name: "general",
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Linear,
            retry_rate_limits: false,
            retry_empty_responses: false,
        }
    }

    /// Scale all delays; tests use milliseconds.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential => self.base_delay.saturating_mul(2u32.saturating_pow(attempt)),
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
        }
    }

    pub fn should_retry(&self, err: &ProviderError) -> bool {
        err.is_transient()
            || (self.retry_rate_limits && err.is_rate_limited())
            || (self.retry_empty_responses && matches!(err, ProviderError::EmptyResponse(_)))
    }
}

/// Run `operation` under `policy`, abandoning it when `cancel` fires.
///
/// `operation` receives the 0-based attempt number.
pub async fn retry_async<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut operation: F,
) -> ProviderResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 0u32;

    loop {
        let result = cancel
            .run_until_cancelled(operation(attempt))
            .await
            .ok_or(ProviderError::Cancelled)?;

        match result {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && policy.should_retry(&e) => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    policy = policy.name,
                    "Retry {}/{} in {:?}: {}",
                    attempt,
                    policy.max_retries,
                    delay,
                    e
                );
                metrics::counter!("storyreel_provider_retries_total", "policy" => policy.name)
                    .increment(1);
                cancel
                    .run_until_cancelled(tokio::time::sleep(delay))
                    .await
                    .ok_or(ProviderError::Cancelled)?;
            }
            Err(e) => {
                if attempt > 0 {
                    debug!(policy = policy.name, attempts = attempt + 1, "Giving up: {}", e);
                }
                return Err(e);
            }
        }
    }
}

/// Send `request` under `policy`.
///
/// Every attempt sends a fresh clone of `request`, so bodies are re-sent
/// intact. Non-success statuses are turned into classified errors.
pub async fn send_with_retry(
    client: &Client,
    request: &Request,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> ProviderResult<Response> {
    retry_async(policy, cancel, move |_| async move {
        let attempt = request
            .try_clone()
            .ok_or_else(|| ProviderError::config("request body is not cloneable"))?;
        let response = client.execute(attempt).await?;
        ensure_success(response).await
    })
    .await
}

/// Pass through a successful response or classify the failure.
pub async fn ensure_success(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast(policy: RetryPolicy) -> RetryPolicy {
        policy.with_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_delays() {
        let image = RetryPolicy::image();
        assert_eq!(image.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(image.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(image.delay_for_attempt(3), Duration::from_secs(8));

        let general = RetryPolicy::general();
        assert_eq!(general.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(general.delay_for_attempt(2), Duration::from_secs(2));
    }

    #[test]
    fn test_rate_limit_only_retried_by_media_policies() {
        let limited = ProviderError::RateLimited("429".into());
        assert!(RetryPolicy::voice().should_retry(&limited));
        assert!(!RetryPolicy::general().should_retry(&limited));
        assert!(!RetryPolicy::image().should_retry(&ProviderError::malformed("bad json")));

        let empty = ProviderError::empty_response("no data");
        assert!(RetryPolicy::image().should_retry(&empty));
        assert!(!RetryPolicy::voice().should_retry(&empty));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = retry_async(&fast(RetryPolicy::general()), &CancelToken::never(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::transient("reset"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> =
            retry_async(&fast(RetryPolicy::image()), &CancelToken::never(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Status { status: 400, body: String::new() }) }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Status { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> =
            retry_async(&fast(RetryPolicy::image()), &CancelToken::never(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::RateLimited("slow down".into())) }
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let source = storyreel_models::CancelSource::new();
        let token = source.token();
        let policy = RetryPolicy::image().with_base_delay(Duration::from_secs(60));

        let task = tokio::spawn(async move {
            retry_async::<_, _, ()>(&policy, &token, |_| async {
                Err(ProviderError::transient("down"))
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        source.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("retry loop did not observe cancellation")
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_send_with_retry_resends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_string("{\"prompt\":\"cat\"}"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_string("{\"prompt\":\"cat\"}"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = Client::new();
        let request = client
            .post(format!("{}/generate", server.uri()))
            .header("content-type", "application/json")
            .body("{\"prompt\":\"cat\"}")
            .build()
            .unwrap();

        let response = send_with_retry(&client, &request, &fast(RetryPolicy::image()), &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(response.text().await.unwrap(), "ok");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_send_with_retry_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        let request = client.post(server.uri()).body("{}").build().unwrap();
        let err = send_with_retry(&client, &request, &fast(RetryPolicy::voice()), &CancelToken::never())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Status { status: 401, .. }));
    }
}
