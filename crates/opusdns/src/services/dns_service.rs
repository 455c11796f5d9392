//! Zone, RRSet and DNSSEC endpoints
//!
//! All calls go through the shared [`RequestExecutor`], so retries and rate
//! limiting apply uniformly.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MAX_PAGE_SIZE;
use crate::errors::{OpusDnsError, Result};
use crate::http::{ApiRequest, RequestExecutor};
use crate::models::{
    ListZonesOptions, RRSet, RRSetListBody, RRSetOperation, RRSetPatchRequest, Zone,
    ZoneCreateRequest, ZoneListResponse, ZoneSummary,
};
use crate::zones::{ZonePage, ZoneSource};

/// DNS zone management over the OpusDNS API
pub struct DnsService {
    executor: Arc<RequestExecutor>,
    api_version: String,
    page_size: u32,
}

impl DnsService {
    pub fn new(executor: Arc<RequestExecutor>, api_version: impl Into<String>, page_size: u32) -> Self {
        Self {
            executor,
            api_version: api_version.into(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn path(&self, suffix: &str) -> String {
        format!("/{}/dns{}", self.api_version, suffix)
    }

    fn zone_path(&self, zone: &str, suffix: &str) -> Result<String> {
        let zone = zone.trim().trim_end_matches('.');
        if zone.is_empty() {
            return Err(OpusDnsError::Validation("zone name is required".to_string()));
        }
        Ok(self.path(&format!("/{}{}", urlencoding::encode(zone), suffix)))
    }

    /// Fetch one page of zones
    pub async fn list_zones_page(
        &self,
        options: &ListZonesOptions,
        cancel: &CancellationToken,
    ) -> Result<ZoneListResponse> {
        let mut request = ApiRequest::get(self.path(""))
            .query("page", options.page.unwrap_or(1))
            .query(
                "page_size",
                options.page_size.unwrap_or(self.page_size).clamp(1, MAX_PAGE_SIZE),
            );
        if let Some(search) = &options.search {
            request = request.query("search", search);
        }
        if let Some(suffix) = &options.suffix {
            request = request.query("suffix", suffix);
        }
        if let Some(status) = options.dnssec_status {
            request = request.query("dnssec_status", enum_value(&status)?);
        }
        if let Some(sort_by) = options.sort_by {
            request = request.query("sort_by", enum_value(&sort_by)?);
        }
        if let Some(order) = options.sort_order {
            request = request.query("sort_order", enum_value(&order)?);
        }

        self.executor.execute_json(&request, cancel).await
    }

    /// Fetch every zone matching `options`, following pagination to the end
    pub async fn list_zones(
        &self,
        options: &ListZonesOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        let mut page = options.page.unwrap_or(1);

        loop {
            let page_options = ListZonesOptions {
                page: Some(page),
                ..options.clone()
            };
            let response = self.list_zones_page(&page_options, cancel).await?;
            let fetched = response.results.len();
            zones.extend(response.results);

            debug!("Fetched zone page {} ({} zones)", page, fetched);
            if !response.pagination.has_next_page || fetched == 0 {
                break;
            }
            page += 1;
        }

        Ok(zones)
    }

    pub async fn get_zone(&self, name: &str, cancel: &CancellationToken) -> Result<Zone> {
        let request = ApiRequest::get(self.zone_path(name, "")?);
        self.executor.execute_json(&request, cancel).await
    }

    pub async fn create_zone(
        &self,
        zone: &ZoneCreateRequest,
        cancel: &CancellationToken,
    ) -> Result<Zone> {
        let request = ApiRequest::post(self.path("")).json(zone)?;
        let created: Zone = self.executor.execute_json(&request, cancel).await?;
        info!("Created zone {}", created.name);
        Ok(created)
    }

    pub async fn delete_zone(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        let request = ApiRequest::delete(self.zone_path(name, "")?);
        self.executor.execute(&request, cancel).await?;
        info!("Deleted zone {}", name);
        Ok(())
    }

    pub async fn get_summary(&self, cancel: &CancellationToken) -> Result<ZoneSummary> {
        let request = ApiRequest::get(self.path("/summary"));
        self.executor.execute_json(&request, cancel).await
    }

    pub async fn get_rrsets(&self, zone: &str, cancel: &CancellationToken) -> Result<Vec<RRSet>> {
        let request = ApiRequest::get(self.zone_path(zone, "/rrsets")?);
        let body: RRSetListBody = self.executor.execute_json(&request, cancel).await?;
        Ok(body.into())
    }

    /// Apply a batch of upsert/remove operations to a zone
    pub async fn patch_rrsets(
        &self,
        zone: &str,
        ops: Vec<RRSetOperation>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let count = ops.len();
        let request =
            ApiRequest::patch(self.zone_path(zone, "/rrsets")?).json(&RRSetPatchRequest { ops })?;
        self.executor.execute(&request, cancel).await?;
        debug!("Applied {} rrset operations to {}", count, zone);
        Ok(())
    }

    pub async fn upsert_rrset(
        &self,
        zone: &str,
        rrset: RRSet,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.patch_rrsets(zone, vec![RRSetOperation::upsert(rrset)], cancel)
            .await
    }

    pub async fn remove_rrset(
        &self,
        zone: &str,
        rrset: RRSet,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.patch_rrsets(zone, vec![RRSetOperation::remove(rrset)], cancel)
            .await
    }

    pub async fn enable_dnssec(
        &self,
        zone: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let request = ApiRequest::post(self.zone_path(zone, "/dnssec/enable")?);
        let changes = self.execute_optional_json(&request, cancel).await?;
        info!("Enabled DNSSEC for {}", zone);
        Ok(changes)
    }

    pub async fn disable_dnssec(
        &self,
        zone: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let request = ApiRequest::post(self.zone_path(zone, "/dnssec/disable")?);
        let changes = self.execute_optional_json(&request, cancel).await?;
        info!("Disabled DNSSEC for {}", zone);
        Ok(changes)
    }

    async fn execute_optional_json(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let response = self.executor.execute(request, cancel).await?;
        if response.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        response.json()
    }
}

#[async_trait]
impl ZoneSource for DnsService {
    async fn fetch_zone_page(&self, page: u32, cancel: &CancellationToken) -> Result<ZonePage> {
        let options = ListZonesOptions {
            page: Some(page),
            ..ListZonesOptions::default()
        };
        let response = self.list_zones_page(&options, cancel).await?;
        Ok(ZonePage {
            zones: response.results,
            has_next_page: response.pagination.has_next_page,
        })
    }
}

/// Query-string form of a serde enum
fn enum_value<T: serde::Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}
