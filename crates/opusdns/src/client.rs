//! High level client tying the API, zone cache and propagation checks together

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::errors::Result;
use crate::http::{ReqwestTransport, RequestExecutor, Transport};
use crate::models::{RRSet, RecordType};
use crate::propagation::{HickoryTxtLookup, PropagationReport, PropagationVerifier, TxtLookup};
use crate::services::DnsService;
use crate::zones::{relative_record_name, ZoneResolver};

/// OpusDNS API client
///
/// All operations observe the client-wide cancellation token, see
/// [`OpusDnsClient::cancellation_token`].
pub struct OpusDnsClient {
    config: ClientConfig,
    executor: Arc<RequestExecutor>,
    dns: Arc<DnsService>,
    zones: ZoneResolver,
    verifier: PropagationVerifier,
    cancel: CancellationToken,
}

impl OpusDnsClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(
            config.api_endpoint.clone(),
            config.api_key.clone(),
            &config.user_agent,
            config.http_timeout,
        )?;
        let lookup = HickoryTxtLookup::new(config.propagation.recursion_desired);
        Self::with_components(config, Arc::new(transport), Arc::new(lookup))
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Build a client over custom HTTP and DNS backends
    pub fn with_components(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        lookup: Arc<dyn TxtLookup>,
    ) -> Result<Self> {
        config.validate()?;

        let executor = Arc::new(RequestExecutor::new(transport, config.retry));
        let dns = Arc::new(DnsService::new(
            executor.clone(),
            config.api_version.clone(),
            config.page_size,
        ));
        let zones = ZoneResolver::new(dns.clone(), config.zone_cache_ttl);
        let verifier = PropagationVerifier::new(lookup, config.propagation.clone());

        Ok(Self {
            config,
            executor,
            dns,
            zones,
            verifier,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dns(&self) -> &DnsService {
        &self.dns
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn zones(&self) -> &ZoneResolver {
        &self.zones
    }

    pub fn verifier(&self) -> &PropagationVerifier {
        &self.verifier
    }

    /// Token every client operation observes; cancel it to abort in-flight work
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn resolve_zone(&self, fqdn: &str) -> Result<String> {
        self.zones.resolve_zone(fqdn, &self.cancel).await
    }

    pub fn invalidate_zone_cache(&self) {
        self.zones.invalidate();
    }

    /// Create or replace the TXT RRSet at `fqdn` with a single value
    pub async fn upsert_txt_record(&self, fqdn: &str, value: &str) -> Result<()> {
        let zone = self.resolve_zone(fqdn).await?;
        let name = relative_record_name(fqdn, &zone);
        let rrset = RRSet::new(name.clone(), RecordType::TXT, self.config.ttl)
            .with_record(quote_txt_value(value));

        self.dns
            .upsert_rrset(&zone, rrset, &self.cancel)
            .await
            .inspect_err(|e| self.forget_missing_zone(e, &zone))?;

        info!("Upserted TXT {} in zone {}", name, zone);
        Ok(())
    }

    /// Delete the TXT RRSet at `fqdn`
    pub async fn remove_txt_record(&self, fqdn: &str) -> Result<()> {
        let zone = self.resolve_zone(fqdn).await?;
        let name = relative_record_name(fqdn, &zone);
        let rrset = RRSet::new(name.clone(), RecordType::TXT, self.config.ttl);

        self.dns
            .remove_rrset(&zone, rrset, &self.cancel)
            .await
            .inspect_err(|e| self.forget_missing_zone(e, &zone))?;

        info!("Removed TXT {} from zone {}", name, zone);
        Ok(())
    }

    pub async fn wait_for_propagation(&self, fqdn: &str, value: &str) -> Result<PropagationReport> {
        self.verifier
            .wait_for_propagation(fqdn, value, &self.cancel)
            .await
    }

    /// Upsert a TXT record, then block until it is visible
    pub async fn upsert_txt_record_and_wait(
        &self,
        fqdn: &str,
        value: &str,
    ) -> Result<PropagationReport> {
        self.upsert_txt_record(fqdn, value).await?;
        self.wait_for_propagation(fqdn, value).await
    }

    fn forget_missing_zone(&self, err: &crate::errors::OpusDnsError, zone: &str) {
        if err.is_not_found() {
            warn!("Zone {} no longer exists, dropping zone cache", zone);
            self.zones.invalidate();
        }
    }
}

/// TXT rdata is sent quoted
pub fn quote_txt_value(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value.to_string()
    } else {
        format!("\"{}\"", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_txt_value() {
        assert_eq!(quote_txt_value("token"), "\"token\"");
        assert_eq!(quote_txt_value("\"token\""), "\"token\"");
        assert_eq!(quote_txt_value("\""), "\"\"\"");
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(OpusDnsClient::new(ClientConfig::default()).is_err());
    }
}
