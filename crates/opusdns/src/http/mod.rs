//! HTTP plumbing: one-shot transport, retry policy and the retrying executor

mod executor;
mod retry;
mod transport;

pub(crate) use executor::sleep_or_cancel;
pub use executor::{classify, ApiOutcome, RequestExecutor};
pub use retry::{parse_retry_after, RateLimitState, RetryPolicy, MAX_RETRY_AFTER};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
