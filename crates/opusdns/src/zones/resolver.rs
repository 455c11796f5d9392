use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ZoneSource;
use crate::errors::{OpusDnsError, Result};
use crate::models::Zone;

/// Upper bound on pages drained in one refresh
const MAX_PAGES: u32 = 10_000;

/// Zones known at one point in time
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    pub zones: Vec<Zone>,
    pub fetched_at: Instant,
}

impl ZoneSnapshot {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self {
            zones,
            fetched_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.is_empty() && self.fetched_at.elapsed() < ttl
    }
}

/// Strip one trailing dot; record names are matched case-insensitively
pub fn normalize_fqdn(fqdn: &str) -> String {
    let fqdn = fqdn.trim();
    fqdn.strip_suffix('.').unwrap_or(fqdn).to_ascii_lowercase()
}

/// Longest zone whose name is a label-aligned suffix of `fqdn`
pub fn find_owning_zone<'a>(fqdn: &str, zones: &'a [Zone]) -> Result<&'a Zone> {
    if zones.is_empty() {
        return Err(OpusDnsError::NoZones);
    }

    let name = format!("{}.", normalize_fqdn(fqdn));
    zones
        .iter()
        .filter(|zone| {
            let zone_name = normalize_fqdn(&zone.name);
            !zone_name.is_empty()
                && (name == format!("{}.", zone_name) || name.ends_with(&format!(".{}.", zone_name)))
        })
        .max_by_key(|zone| normalize_fqdn(&zone.name).len())
        .ok_or_else(|| OpusDnsError::ZoneNotFound {
            fqdn: fqdn.to_string(),
            zones_considered: zones.len(),
        })
}

/// Record name relative to `zone`, `@` at the apex
pub fn relative_record_name(fqdn: &str, zone: &str) -> String {
    let fqdn = normalize_fqdn(fqdn);
    let zone = normalize_fqdn(zone);
    if fqdn == zone {
        return "@".to_string();
    }
    fqdn.strip_suffix(&format!(".{}", zone))
        .map(str::to_string)
        .unwrap_or(fqdn)
}

/// Cached zone inventory with longest-suffix lookup
///
/// Refreshes replace the whole snapshot, so readers never observe a partial
/// listing. Concurrent refreshes are coalesced.
pub struct ZoneResolver {
    source: Arc<dyn ZoneSource>,
    ttl: Option<Duration>,
    snapshot: RwLock<Option<Arc<ZoneSnapshot>>>,
    refresh: Mutex<()>,
}

impl ZoneResolver {
    /// `ttl` of `None` disables caching
    pub fn new(source: Arc<dyn ZoneSource>, ttl: Option<Duration>) -> Self {
        Self {
            source,
            ttl,
            snapshot: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub async fn resolve_zone(&self, fqdn: &str, cancel: &CancellationToken) -> Result<String> {
        if normalize_fqdn(fqdn).is_empty() {
            return Err(OpusDnsError::Validation("fqdn is required".to_string()));
        }

        let snapshot = self.snapshot(cancel).await?;
        let zone = find_owning_zone(fqdn, &snapshot.zones)?;
        let name = zone.name.trim_end_matches('.').to_string();
        debug!("Resolved {} to zone {}", fqdn, name);
        Ok(name)
    }

    /// Current snapshot, refreshed when missing, empty or older than the TTL
    pub async fn snapshot(&self, cancel: &CancellationToken) -> Result<Arc<ZoneSnapshot>> {
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OpusDnsError::Cancelled),
            guard = self.refresh.lock() => guard,
        };
        // another task may have refreshed while we waited
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }

        let snapshot = Arc::new(self.fetch_all(cancel).await?);
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next lookup refetches
    pub fn invalidate(&self) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        debug!("Zone cache invalidated");
    }

    fn cached(&self) -> Option<Arc<ZoneSnapshot>> {
        let ttl = self.ttl?;
        let guard = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().filter(|s| s.is_fresh(ttl)).cloned()
    }

    async fn fetch_all(&self, cancel: &CancellationToken) -> Result<ZoneSnapshot> {
        let mut zones = Vec::new();
        let mut page = 1;

        loop {
            let result = self.source.fetch_zone_page(page, cancel).await?;
            let fetched = result.zones.len();
            zones.extend(result.zones);

            if !result.has_next_page || fetched == 0 {
                break;
            }
            if page >= MAX_PAGES {
                warn!(
                    "Zone listing still has more pages after {}, using the first {} zones",
                    MAX_PAGES,
                    zones.len()
                );
                break;
            }
            page += 1;
        }

        info!("Loaded {} zones ({} pages)", zones.len(), page);
        Ok(ZoneSnapshot::new(zones))
    }
}
