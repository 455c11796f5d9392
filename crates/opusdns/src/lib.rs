//! OpusDNS client
//!
//! This crate manages DNS zones and records through the OpusDNS API and
//! verifies that changes are visible to public resolvers.
//!
//! # Features
//!
//! - **Resilient requests**: exponential backoff with jitter, `Retry-After`
//!   aware rate limiting shared across calls, typed API errors
//! - **Zone resolution**: maps any name to the longest owning zone using a
//!   cached, fully paginated zone listing
//! - **Propagation checks**: polls several resolvers per round under an
//!   `any`/`all` quorum with a bounded total wait
//!
//! # Usage
//!
//! ```ignore
//! use opusdns::{ClientConfig, OpusDnsClient};
//!
//! let client = OpusDnsClient::new(ClientConfig::from_env()?)?;
//!
//! // Publish an ACME DNS-01 challenge and wait until resolvers see it
//! client
//!     .upsert_txt_record_and_wait("_acme-challenge.www.example.com", "token")
//!     .await?;
//!
//! client.remove_txt_record("_acme-challenge.www.example.com").await?;
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod propagation;
pub mod services;
pub mod zones;

// Re-export main types
pub use client::OpusDnsClient;
pub use config::{ClientConfig, PropagationConfig, Quorum};
pub use errors::{ApiError, AttemptFailure, OpusDnsError, PropagationTimeout, Result, TransportError};
pub use http::{ApiOutcome, ApiRequest, ApiResponse, RateLimitState, RequestExecutor, RetryPolicy, Transport};
pub use models::{DnssecStatus, ListZonesOptions, RRSet, RRSetOperation, RecordType, Zone};
pub use propagation::{HickoryTxtLookup, LookupError, PollOutcome, PropagationReport, PropagationVerifier, TxtLookup};
pub use services::DnsService;
pub use zones::{ZoneResolver, ZoneSnapshot, ZoneSource};
