//! Client configuration
//!
//! Every setting has a default and can be overridden from `OPUSDNS_*`
//! environment variables or with the chained `with_*` setters.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{OpusDnsError, Result};
use crate::http::RetryPolicy;

pub const DEFAULT_ENDPOINT: &str = "https://api.opusdns.com";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_TTL: u32 = 60;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ZONE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 1000;

pub const DEFAULT_RESOLVERS: &[&str] = &["8.8.8.8:53", "1.1.1.1:53"];
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(6);
pub const DEFAULT_POLLING_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_POLLING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// How many resolvers must see the record in one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quorum {
    /// At least one resolver confirms
    #[default]
    Any,
    /// Every configured resolver confirms in the same round
    All,
}

impl fmt::Display for Quorum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quorum::Any => write!(f, "any"),
            Quorum::All => write!(f, "all"),
        }
    }
}

impl FromStr for Quorum {
    type Err = OpusDnsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Quorum::Any),
            "all" => Ok(Quorum::All),
            other => Err(OpusDnsError::config(
                "propagation_quorum",
                format!("unknown quorum '{}', expected 'any' or 'all'", other),
            )),
        }
    }
}

/// Propagation polling policy
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationConfig {
    pub resolvers: Vec<SocketAddr>,
    pub query_timeout: Duration,
    pub interval: Duration,
    pub timeout: Duration,
    pub quorum: Quorum,
    /// Set the RD bit on queries. Disable to poll authoritative servers directly.
    pub recursion_desired: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            resolvers: DEFAULT_RESOLVERS
                .iter()
                .filter_map(|addr| addr.parse().ok())
                .collect(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            interval: DEFAULT_POLLING_INTERVAL,
            timeout: DEFAULT_POLLING_TIMEOUT,
            quorum: Quorum::Any,
            recursion_desired: true,
        }
    }
}

impl PropagationConfig {
    pub fn with_resolvers(mut self, resolvers: Vec<SocketAddr>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn with_quorum(mut self, quorum: Quorum) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolvers.is_empty() {
            return Err(OpusDnsError::config(
                "dns_resolvers",
                "at least one resolver is required",
            ));
        }
        if self.interval.is_zero() {
            return Err(OpusDnsError::config(
                "polling_interval",
                "must be greater than zero",
            ));
        }
        if self.timeout.is_zero() {
            return Err(OpusDnsError::config(
                "polling_timeout",
                "must be greater than zero",
            ));
        }
        if self.timeout > MAX_POLLING_TIMEOUT {
            return Err(OpusDnsError::config(
                "polling_timeout",
                format!("must not exceed {:?}", MAX_POLLING_TIMEOUT),
            ));
        }
        if self.query_timeout.is_zero() {
            return Err(OpusDnsError::config(
                "dns_query_timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Parse `host` or `host:port`, defaulting to port 53
pub fn parse_resolver(value: &str) -> Result<SocketAddr> {
    let value = value.trim();
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = value.trim_matches(|c| c == '[' || c == ']').parse() {
        return Ok(SocketAddr::new(ip, 53));
    }
    Err(OpusDnsError::config(
        "dns_resolvers",
        format!("invalid resolver address '{}'", value),
    ))
}

/// OpusDNS client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub api_endpoint: String,
    pub api_version: String,
    /// TTL for records written by the TXT helpers
    pub ttl: u32,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    /// `None` disables zone caching
    pub zone_cache_ttl: Option<Duration>,
    pub page_size: u32,
    pub user_agent: String,
    pub propagation: PropagationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            ttl: DEFAULT_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            retry: RetryPolicy::default(),
            zone_cache_ttl: Some(DEFAULT_ZONE_CACHE_TTL),
            page_size: DEFAULT_PAGE_SIZE,
            user_agent: format!("opusdns-rs/{}", env!("CARGO_PKG_VERSION")),
            propagation: PropagationConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `OPUSDNS_*` environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(key) = get("OPUSDNS_API_KEY") {
            config.api_key = key;
        }
        if let Some(endpoint) = get("OPUSDNS_API_ENDPOINT") {
            config.api_endpoint = endpoint;
        }
        if let Some(version) = get("OPUSDNS_API_VERSION") {
            config.api_version = version;
        }
        if let Some(ttl) = get("OPUSDNS_TTL") {
            config.ttl = parse_number("ttl", &ttl)?;
        }
        if let Some(timeout) = get("OPUSDNS_HTTP_TIMEOUT") {
            config.http_timeout = parse_seconds("http_timeout", &timeout)?;
        }
        if let Some(retries) = get("OPUSDNS_MAX_RETRIES") {
            config.retry.max_attempts = parse_number("max_retries", &retries)?;
        }
        if let Some(min) = get("OPUSDNS_RETRY_WAIT_MIN") {
            config.retry.min_backoff = parse_seconds("retry_wait_min", &min)?;
        }
        if let Some(max) = get("OPUSDNS_RETRY_WAIT_MAX") {
            config.retry.max_backoff = parse_seconds("retry_wait_max", &max)?;
        }
        if let Some(cache_ttl) = get("OPUSDNS_ZONE_CACHE_TTL") {
            let ttl = parse_seconds("zone_cache_ttl", &cache_ttl)?;
            config.zone_cache_ttl = (!ttl.is_zero()).then_some(ttl);
        }
        if let Some(resolvers) = get("OPUSDNS_DNS_RESOLVERS") {
            config.propagation.resolvers = resolvers
                .split(',')
                .filter(|r| !r.trim().is_empty())
                .map(parse_resolver)
                .collect::<Result<_>>()?;
        }
        if let Some(timeout) = get("OPUSDNS_DNS_QUERY_TIMEOUT") {
            config.propagation.query_timeout = parse_seconds("dns_query_timeout", &timeout)?;
        }
        if let Some(interval) = get("OPUSDNS_POLLING_INTERVAL") {
            config.propagation.interval = parse_seconds("polling_interval", &interval)?;
        }
        if let Some(timeout) = get("OPUSDNS_POLLING_TIMEOUT") {
            config.propagation.timeout = parse_seconds("polling_timeout", &timeout)?;
        }
        if let Some(quorum) = get("OPUSDNS_PROPAGATION_QUORUM") {
            config.propagation.quorum = quorum.parse()?;
        }

        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_zone_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.zone_cache_ttl = ttl;
        self
    }

    pub fn with_propagation(mut self, propagation: PropagationConfig) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(OpusDnsError::config(
                "api_key",
                "API key is required (set OPUSDNS_API_KEY)",
            ));
        }
        if self.api_endpoint.trim().is_empty() {
            return Err(OpusDnsError::config("api_endpoint", "must not be empty"));
        }
        Url::parse(&self.api_endpoint).map_err(|e| {
            OpusDnsError::config("api_endpoint", format!("invalid URL: {}", e))
        })?;
        if self.api_version.trim().is_empty() {
            return Err(OpusDnsError::config("api_version", "must not be empty"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(OpusDnsError::config(
                "page_size",
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        self.retry.validate()?;
        self.propagation.validate()
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| OpusDnsError::config(field, format!("invalid number '{}'", value)))
}

/// Whole or fractional seconds
fn parse_seconds(field: &'static str, value: &str) -> Result<Duration> {
    let secs: f64 = parse_number(field, value)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| OpusDnsError::config(field, format!("invalid duration '{}'", value)))
}
