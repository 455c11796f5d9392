use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::retry::{parse_retry_after, RateLimitState, RetryPolicy};
use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::errors::{ApiError, AttemptFailure, OpusDnsError, Result, TransportError};

/// Classified result of one attempt
#[derive(Debug)]
pub enum ApiOutcome {
    Success(ApiResponse),
    RetryableFailure {
        error: ApiError,
        retry_after: Option<Duration>,
    },
    TerminalFailure(ApiError),
    TransportFailure(TransportError),
}

/// Map a raw exchange result onto an [`ApiOutcome`]
pub fn classify(result: std::result::Result<ApiResponse, TransportError>) -> ApiOutcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => return ApiOutcome::TransportFailure(err),
    };

    if (200..300).contains(&response.status) {
        return ApiOutcome::Success(response);
    }

    let error = ApiError::from_response(response.status, &response.headers, &response.body);
    if error.is_retryable() {
        let retry_after = response
            .header("retry-after")
            .and_then(|value| parse_retry_after(value, SystemTime::now()));
        ApiOutcome::RetryableFailure { error, retry_after }
    } else {
        ApiOutcome::TerminalFailure(error)
    }
}

/// Runs API operations to completion, retrying transient failures
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    rate_limit: RateLimitState,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            rate_limit: RateLimitState::new(),
        }
    }

    /// Share rate limiting with other executors talking to the same account
    pub fn with_rate_limit_state(mut self, state: RateLimitState) -> Self {
        self.rate_limit = state;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn rate_limit_state(&self) -> &RateLimitState {
        &self.rate_limit
    }

    pub async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(OpusDnsError::Cancelled);
            }

            // the deadline may be extended by other callers while we sleep
            while let Some(wait) = self.rate_limit.remaining() {
                warn!(
                    "Rate limited, waiting {:?} before {} {}",
                    wait, request.method, request.path
                );
                sleep_or_cancel(wait, cancel).await?;
            }

            debug!(
                "Dispatching {} {} (attempt {})",
                request.method, request.path, attempt
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OpusDnsError::Cancelled),
                result = self.transport.send(request) => result,
            };

            let mut server_delay = None;
            let failure = match classify(result) {
                ApiOutcome::Success(response) => return Ok(response),
                ApiOutcome::TerminalFailure(error) => {
                    debug!(
                        "{} {} failed with terminal status {}",
                        request.method, request.path, error.status
                    );
                    return Err(OpusDnsError::Api(error));
                }
                ApiOutcome::RetryableFailure { error, retry_after } => {
                    if error.is_rate_limited() {
                        if let Some(until) =
                            retry_after.and_then(|delay| Instant::now().checked_add(delay))
                        {
                            self.rate_limit.limit_until(until);
                        }
                    } else {
                        server_delay = retry_after;
                    }
                    AttemptFailure::Status(error)
                }
                ApiOutcome::TransportFailure(error) => AttemptFailure::Transport(error),
            };

            if attempt >= self.policy.max_attempts {
                warn!(
                    "{} {} gave up after {} attempts: {}",
                    request.method,
                    request.path,
                    attempt + 1,
                    failure
                );
                return Err(OpusDnsError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: failure,
                });
            }

            attempt += 1;
            // a 5xx Retry-After acts as a floor on the backoff
            let delay = self
                .policy
                .backoff(attempt)
                .max(server_delay.unwrap_or(Duration::ZERO));
            warn!(
                "{} {} failed ({}), retry {}/{} in {:?}",
                request.method, request.path, failure, attempt, self.policy.max_attempts, delay
            );
            sleep_or_cancel(delay, cancel).await?;
        }
    }

    /// Execute and decode a JSON body
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.execute(request, cancel).await?.json()
    }
}

pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OpusDnsError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::retry::MAX_RETRY_AFTER;
    use crate::http::ReqwestTransport;
    use async_trait::async_trait;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type Step = std::result::Result<ApiResponse, TransportError>;

    /// Replays a fixed script of responses, then answers 200 `{}`
    struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &ApiRequest) -> Step {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(status(200)))
        }
    }

    fn status(code: u16) -> ApiResponse {
        ApiResponse::new(code, HeaderMap::new(), b"{}".to_vec())
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5)).unwrap()
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let transport = ScriptedTransport::new(vec![
            Ok(status(500)),
            Ok(status(503)),
            Err(TransportError::Connect("connection refused".into())),
            Ok(status(200)),
        ]);
        let executor = RequestExecutor::new(transport.clone(), fast_policy(3));

        let response = executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_status() {
        let transport = ScriptedTransport::new(vec![
            Ok(status(500)),
            Ok(status(502)),
            Ok(status(503)),
            Ok(status(200)),
        ]);
        let executor = RequestExecutor::new(transport.clone(), fast_policy(2));

        let err = executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert!(matches!(
            err,
            OpusDnsError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_exhaustion_preserves_transport_cause() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout("first".into())),
            Err(TransportError::Timeout("second".into())),
        ]);
        let executor = RequestExecutor::new(transport.clone(), fast_policy(1));

        let err = executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 2);
        match err {
            OpusDnsError::RetriesExhausted {
                attempts: 2,
                last: AttemptFailure::Transport(TransportError::Timeout(msg)),
            } => assert_eq!(msg, "second"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_terminal() {
        let transport = ScriptedTransport::new(vec![Ok(ApiResponse::new(
            404,
            HeaderMap::new(),
            br#"{"message": "zone not found", "error_code": "ERROR_ZONE_NOT_FOUND"}"#.to_vec(),
        ))]);
        let executor = RequestExecutor::new(transport.clone(), fast_policy(3));

        let err = executor
            .execute(&ApiRequest::get("/v1/dns/missing.com"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert!(err.is_not_found());
        let api = err.api_error().unwrap();
        assert_eq!(api.error_code.as_deref(), Some("ERROR_ZONE_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_conflict_is_terminal() {
        let transport = ScriptedTransport::new(vec![Ok(status(409)), Ok(status(200))]);
        let executor = RequestExecutor::new(transport.clone(), fast_policy(3));

        let err = executor
            .execute(&ApiRequest::post("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_zero_retries_dispatches_once() {
        let transport = ScriptedTransport::new(vec![Ok(status(500))]);
        let executor = RequestExecutor::new(transport.clone(), RetryPolicy::none());

        let err = executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert!(matches!(
            err,
            OpusDnsError::RetriesExhausted { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_retry_after_pauses_shared_state() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("1"));
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::new(429, headers, Vec::new())),
            Ok(status(200)),
        ]);
        let shared = RateLimitState::new();
        let executor =
            RequestExecutor::new(transport.clone(), fast_policy(3)).with_rate_limit_state(shared.clone());

        let start = Instant::now();
        executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(900));
        assert_eq!(transport.calls(), 2);
        assert!(shared.remaining().is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_is_respected_before_first_attempt() {
        let transport = ScriptedTransport::new(vec![Ok(status(200))]);
        let executor = RequestExecutor::new(transport.clone(), fast_policy(0));
        executor
            .rate_limit_state()
            .limit_until(Instant::now() + Duration::from_millis(100));

        let start = Instant::now();
        executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_rate_limit_extended_by_another_caller_is_honoured() {
        let transport = ScriptedTransport::new(vec![Ok(status(200))]);
        let shared = RateLimitState::new();
        let executor =
            RequestExecutor::new(transport.clone(), fast_policy(0)).with_rate_limit_state(shared.clone());
        shared.limit_until(Instant::now() + Duration::from_millis(50));

        let other = shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            other.limit_until(Instant::now() + Duration::from_millis(200));
        });

        let start = Instant::now();
        executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(shared.remaining().is_none());
        assert_eq!(transport.calls(), 1);
    }

    /// Answers 429 to the first request and 200 afterwards, recording dispatch times
    struct GatedTransport {
        first: Mutex<Option<ApiResponse>>,
        dispatched: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, _request: &ApiRequest) -> Step {
            self.dispatched.lock().unwrap().push(Instant::now());
            let first = self.first.lock().unwrap().take();
            Ok(first.unwrap_or_else(|| status(200)))
        }
    }

    #[tokio::test]
    async fn test_rate_limit_from_one_caller_pauses_another() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("1"));
        let transport = Arc::new(GatedTransport {
            first: Mutex::new(Some(ApiResponse::new(429, headers, Vec::new()))),
            dispatched: Mutex::new(Vec::new()),
        });
        let shared = RateLimitState::new();
        let limited = RequestExecutor::new(transport.clone(), fast_policy(3))
            .with_rate_limit_state(shared.clone());
        let other = RequestExecutor::new(transport.clone(), fast_policy(3))
            .with_rate_limit_state(shared.clone());
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let request = ApiRequest::get("/v1/dns");
        let late = async {
            // starts after the first caller has seen its 429
            tokio::time::sleep(Duration::from_millis(50)).await;
            other.execute(&request, &cancel).await
        };
        let (first, second) = tokio::join!(limited.execute(&request, &cancel), late);
        first.unwrap();
        second.unwrap();

        let dispatched = transport.dispatched.lock().unwrap().clone();
        assert_eq!(dispatched.len(), 3);
        // only the first request was sent before the Retry-After deadline
        let early = dispatched
            .iter()
            .filter(|at| at.duration_since(start) < Duration::from_millis(900))
            .count();
        assert_eq!(early, 1);
    }

    #[tokio::test]
    async fn test_huge_retry_after_does_not_overflow() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("18446744073709551615"));
        let transport = ScriptedTransport::new(vec![Ok(ApiResponse::new(429, headers, Vec::new()))]);
        let executor = RequestExecutor::new(transport.clone(), RetryPolicy::none());

        let err = executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OpusDnsError::RetriesExhausted { attempts: 1, .. }
        ));
        let remaining = executor.rate_limit_state().remaining().unwrap();
        assert!(remaining <= MAX_RETRY_AFTER);
    }

    #[tokio::test]
    async fn test_server_retry_after_is_a_backoff_floor() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("1"));
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::new(503, headers, Vec::new())),
            Ok(status(200)),
        ]);
        let executor = RequestExecutor::new(transport.clone(), fast_policy(3));

        let start = Instant::now();
        executor
            .execute(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(900));
        assert_eq!(transport.calls(), 2);
        assert!(executor.rate_limit_state().remaining().is_none());
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let transport = ScriptedTransport::new(vec![Ok(status(500)), Ok(status(500))]);
        let policy =
            RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(30)).unwrap();
        let executor = RequestExecutor::new(transport.clone(), policy);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = executor
            .execute(&ApiRequest::get("/v1/dns"), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_dispatch() {
        let transport = ScriptedTransport::new(vec![]);
        let executor = RequestExecutor::new(transport.clone(), fast_policy(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .execute(&ApiRequest::get("/v1/dns"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_classify() {
        assert!(matches!(classify(Ok(status(204))), ApiOutcome::Success(_)));
        assert!(matches!(
            classify(Ok(status(429))),
            ApiOutcome::RetryableFailure {
                retry_after: None,
                ..
            }
        ));
        assert!(matches!(
            classify(Ok(status(500))),
            ApiOutcome::RetryableFailure { .. }
        ));
        assert!(matches!(
            classify(Ok(status(404))),
            ApiOutcome::TerminalFailure(_)
        ));
        assert!(matches!(
            classify(Ok(status(302))),
            ApiOutcome::TerminalFailure(_)
        ));
        assert!(matches!(
            classify(Err(TransportError::Other("boom".into()))),
            ApiOutcome::TransportFailure(_)
        ));
    }

    #[tokio::test]
    async fn test_reqwest_transport_retries_against_server() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/dns"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/dns"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(
            mock_server.uri(),
            "test-key",
            "opusdns-rs/test",
            Duration::from_secs(5),
        )
        .unwrap();
        let executor = RequestExecutor::new(Arc::new(transport), fast_policy(3));

        let body: serde_json::Value = executor
            .execute_json(&ApiRequest::get("/v1/dns"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }
}
