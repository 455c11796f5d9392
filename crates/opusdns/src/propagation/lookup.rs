use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use thiserror::Error;
use tracing::debug;

/// A single resolver failed to answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("query timed out")]
    Timeout,

    #[error("server responded {0}")]
    ServerFailure(String),

    #[error("lookup failed: {0}")]
    Other(String),
}

/// One TXT query against one resolver
///
/// NXDOMAIN and empty answers are successful lookups with no values.
#[async_trait]
pub trait TxtLookup: Send + Sync {
    async fn lookup_txt(
        &self,
        fqdn: &str,
        resolver: SocketAddr,
        timeout: Duration,
    ) -> Result<Vec<String>, LookupError>;
}

/// [`TxtLookup`] over hickory, one single-server resolver per address
pub struct HickoryTxtLookup {
    recursion_desired: bool,
    resolvers: Mutex<HashMap<(SocketAddr, Duration), TokioAsyncResolver>>,
}

impl Default for HickoryTxtLookup {
    fn default() -> Self {
        Self::new(true)
    }
}

impl HickoryTxtLookup {
    pub fn new(recursion_desired: bool) -> Self {
        Self {
            recursion_desired,
            resolvers: Mutex::new(HashMap::new()),
        }
    }

    fn resolver_for(&self, addr: SocketAddr, timeout: Duration) -> TokioAsyncResolver {
        let mut resolvers = self
            .resolvers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        resolvers
            .entry((addr, timeout))
            .or_insert_with(|| {
                let mut config = ResolverConfig::new();
                config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));

                let mut options = ResolverOpts::default();
                options.timeout = timeout;
                options.attempts = 1;
                // every round must reach the server
                options.cache_size = 0;
                options.use_hosts_file = false;
                options.recursion_desired = self.recursion_desired;

                TokioAsyncResolver::tokio(config, options)
            })
            .clone()
    }
}

#[async_trait]
impl TxtLookup for HickoryTxtLookup {
    async fn lookup_txt(
        &self,
        fqdn: &str,
        resolver: SocketAddr,
        timeout: Duration,
    ) -> Result<Vec<String>, LookupError> {
        let client = self.resolver_for(resolver, timeout);

        match client.txt_lookup(fqdn).await {
            Ok(lookup) => {
                let values: Vec<String> = lookup
                    .iter()
                    .map(|record| {
                        record
                            .txt_data()
                            .iter()
                            .map(|data| String::from_utf8_lossy(data).to_string())
                            .collect()
                    })
                    .collect();
                debug!("{} answered {} TXT values for {}", resolver, values.len(), fqdn);
                Ok(values)
            }
            Err(e) => classify_error(e),
        }
    }
}

fn classify_error(err: ResolveError) -> Result<Vec<String>, LookupError> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
            ResponseCode::NoError | ResponseCode::NXDomain => Ok(Vec::new()),
            code => Err(LookupError::ServerFailure(code.to_string())),
        },
        ResolveErrorKind::Timeout => Err(LookupError::Timeout),
        _ => Err(LookupError::Other(err.to_string())),
    }
}
