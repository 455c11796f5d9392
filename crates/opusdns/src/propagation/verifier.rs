use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::lookup::{LookupError, TxtLookup};
use crate::config::{PropagationConfig, Quorum};
use crate::errors::{OpusDnsError, PropagationTimeout, Result};
use crate::http::sleep_or_cancel;

/// Result of querying one resolver in one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub resolver: SocketAddr,
    pub matched: bool,
    pub error: Option<LookupError>,
}

/// Successful propagation check
#[derive(Debug, Clone)]
pub struct PropagationReport {
    pub fqdn: String,
    pub rounds: u32,
    pub elapsed: Duration,
    /// Resolvers that confirmed in the deciding round
    pub confirmed_by: Vec<SocketAddr>,
}

/// Absolute form with exactly one trailing dot
pub fn to_absolute(fqdn: &str) -> String {
    format!("{}.", fqdn.trim().trim_end_matches('.'))
}

/// TXT values are compared without surrounding quotes
pub fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches('"')
}

/// Whether one round's confirmations satisfy `quorum` over `total` resolvers
pub fn quorum_met(quorum: Quorum, confirmed: usize, total: usize) -> bool {
    match quorum {
        Quorum::Any => confirmed > 0,
        Quorum::All => total > 0 && confirmed == total,
    }
}

/// Polls resolvers until a TXT record is visible or time runs out
pub struct PropagationVerifier {
    lookup: Arc<dyn TxtLookup>,
    config: PropagationConfig,
}

impl PropagationVerifier {
    pub fn new(lookup: Arc<dyn TxtLookup>, config: PropagationConfig) -> Self {
        Self { lookup, config }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    pub async fn wait_for_propagation(
        &self,
        fqdn: &str,
        expected_value: &str,
        cancel: &CancellationToken,
    ) -> Result<PropagationReport> {
        self.wait_for_propagation_with(fqdn, expected_value, &self.config, cancel)
            .await
    }

    /// Same as [`Self::wait_for_propagation`] with a per-call policy
    pub async fn wait_for_propagation_with(
        &self,
        fqdn: &str,
        expected_value: &str,
        config: &PropagationConfig,
        cancel: &CancellationToken,
    ) -> Result<PropagationReport> {
        config.validate()?;
        if fqdn.trim().trim_end_matches('.').is_empty() {
            return Err(OpusDnsError::Validation("fqdn is required".to_string()));
        }

        let fqdn = to_absolute(fqdn);
        let expected = strip_quotes(expected_value);
        let start = Instant::now();
        let deadline = start.checked_add(config.timeout).ok_or_else(|| {
            OpusDnsError::Validation(format!("polling timeout {:?} is too large", config.timeout))
        })?;
        let mut rounds: u32 = 0;
        let mut ever_confirmed = BTreeSet::new();
        let mut pending = config.resolvers.clone();

        info!(
            "Waiting for TXT {} on {} resolvers (quorum {}, timeout {:?})",
            fqdn,
            config.resolvers.len(),
            config.quorum,
            config.timeout
        );

        loop {
            if cancel.is_cancelled() {
                return Err(OpusDnsError::Cancelled);
            }
            if Instant::now() >= deadline {
                let elapsed = start.elapsed();
                warn!(
                    "TXT {} not confirmed after {} rounds ({:?})",
                    fqdn, rounds, elapsed
                );
                return Err(PropagationTimeout {
                    fqdn,
                    quorum: config.quorum,
                    rounds,
                    elapsed,
                    pending: pending.iter().map(SocketAddr::to_string).collect(),
                    confirmed: ever_confirmed.iter().map(SocketAddr::to_string).collect(),
                }
                .into());
            }

            rounds += 1;
            let query_timeout = config
                .query_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            let outcomes = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OpusDnsError::Cancelled),
                outcomes = self.poll_round_within(&fqdn, expected, config, query_timeout) => outcomes,
            };

            let confirmed: Vec<SocketAddr> = outcomes
                .iter()
                .filter(|o| o.matched)
                .map(|o| o.resolver)
                .collect();
            ever_confirmed.extend(confirmed.iter().copied());

            if quorum_met(config.quorum, confirmed.len(), config.resolvers.len()) {
                let elapsed = start.elapsed();
                info!(
                    "TXT {} confirmed by {:?} after {} rounds ({:?})",
                    fqdn, confirmed, rounds, elapsed
                );
                return Ok(PropagationReport {
                    fqdn,
                    rounds,
                    elapsed,
                    confirmed_by: confirmed,
                });
            }

            pending = config
                .resolvers
                .iter()
                .filter(|r| !confirmed.contains(r))
                .copied()
                .collect();
            for outcome in outcomes.iter().filter(|o| o.error.is_some()) {
                debug!(
                    "Round {}: {} failed: {:?}",
                    rounds, outcome.resolver, outcome.error
                );
            }
            debug!(
                "Round {}: {}/{} resolvers confirmed {}",
                rounds,
                confirmed.len(),
                config.resolvers.len(),
                fqdn
            );

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                sleep_or_cancel(config.interval.min(remaining), cancel).await?;
            }
        }
    }

    /// Query every resolver once, concurrently
    ///
    /// Under [`Quorum::Any`] the round ends at the first confirmation and the
    /// remaining queries are dropped.
    pub async fn poll_round(
        &self,
        fqdn: &str,
        expected: &str,
        config: &PropagationConfig,
    ) -> Vec<PollOutcome> {
        self.poll_round_within(fqdn, expected, config, config.query_timeout)
            .await
    }

    async fn poll_round_within(
        &self,
        fqdn: &str,
        expected: &str,
        config: &PropagationConfig,
        query_timeout: Duration,
    ) -> Vec<PollOutcome> {
        let mut queries: FuturesUnordered<_> = config
            .resolvers
            .iter()
            .map(|&resolver| self.query_one(fqdn, expected, resolver, query_timeout))
            .collect();

        let mut outcomes = Vec::with_capacity(config.resolvers.len());
        while let Some(outcome) = queries.next().await {
            let matched = outcome.matched;
            outcomes.push(outcome);
            if matched && config.quorum == Quorum::Any {
                break;
            }
        }
        outcomes
    }

    async fn query_one(
        &self,
        fqdn: &str,
        expected: &str,
        resolver: SocketAddr,
        timeout: Duration,
    ) -> PollOutcome {
        let result = tokio::time::timeout(timeout, self.lookup.lookup_txt(fqdn, resolver, timeout))
            .await
            .unwrap_or(Err(LookupError::Timeout));

        match result {
            Ok(values) => PollOutcome {
                resolver,
                matched: values.iter().any(|v| strip_quotes(v) == expected),
                error: None,
            },
            Err(error) => PollOutcome {
                resolver,
                matched: false,
                error: Some(error),
            },
        }
    }
}
