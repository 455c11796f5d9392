//! Mapping names to the zones that own them

mod resolver;

pub use resolver::{find_owning_zone, normalize_fqdn, relative_record_name, ZoneResolver, ZoneSnapshot};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::models::Zone;

/// One page of the zone listing
#[derive(Debug, Clone, Default)]
pub struct ZonePage {
    pub zones: Vec<Zone>,
    pub has_next_page: bool,
}

/// Paginated zone inventory the resolver drains
#[async_trait]
pub trait ZoneSource: Send + Sync {
    /// Fetch page `page`, starting at 1
    async fn fetch_zone_page(&self, page: u32, cancel: &CancellationToken) -> Result<ZonePage>;
}
