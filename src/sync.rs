use std::sync::Arc;

use hawker_core::crud;
use hawker_core::models::listings::{ConnectionDescriptor, Location, NewListing, Origin};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::provider::{ProviderClient, ProviderItem, ProviderStatus};

/// Counters from one sync pass. `error` is set when the provider went
/// away mid-pass; whatever was added before that point stays.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub added: usize,
    pub skipped: usize,
    pub pages: u32,
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub examined: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// Aligns local inventory with the provider's current supply.
pub struct Reconciler {
    provider: Arc<ProviderClient>,
    page_size: i64,
    page_cap: u32,
}

impl Reconciler {
    pub fn new(provider: Arc<ProviderClient>, page_size: i64, page_cap: u32) -> Self {
        Self {
            provider,
            page_size,
            page_cap,
        }
    }

    /// Pulls all purchasable external supply into inventory. Pages are
    /// walked in order until a short page, bounded by the page cap in case
    /// the upstream total is unreliable. External ids already present,
    /// whether from earlier syncs or earlier in this run, are skipped, so
    /// one id never yields two listings. An unreachable provider ends the pass
    /// cleanly instead of raising: the caller is usually a scheduled job
    /// that will simply try again next tick.
    pub async fn sync(&self, pool: &PgPool, filter: &Location) -> Result<SyncReport> {
        let mut known = crud::listings::external_ids(pool).await?;
        let mut report = SyncReport::default();

        for page in 0..self.page_cap {
            let items = match self.provider.list(filter, page, self.page_size).await {
                Ok((items, _total)) => items,
                Err(e) => {
                    warn!("inventory sync aborted on page {page}: {e}");
                    report.error = Some(e.to_string());
                    return Ok(report);
                }
            };

            report.pages += 1;
            report.fetched += items.len();
            let last_page = (items.len() as i64) < self.page_size;

            for item in items {
                if known.contains(&item.id) {
                    report.skipped += 1;
                    continue;
                }
                known.insert(item.id.clone());
                crud::listings::add_listing(pool, &listing_from_item(item)).await?;
                report.added += 1;
            }

            if last_page {
                break;
            }
        }

        info!(
            added = report.added,
            skipped = report.skipped,
            pages = report.pages,
            "inventory sync finished"
        );
        Ok(report)
    }

    /// Deletes external listings the provider no longer reports live.
    /// An unreachable provider skips that item and moves on; partial
    /// failure must not abort the whole pass.
    pub async fn cleanup(&self, pool: &PgPool) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let mut stale: Vec<i32> = Vec::new();

        for listing in crud::listings::external_listings(pool).await? {
            report.examined += 1;
            let external_id = match &listing.external_id {
                Some(id) => id.clone(),
                None => continue,
            };

            match self.provider.lookup(&external_id).await {
                Ok(ProviderStatus::Online) => {}
                Ok(ProviderStatus::Offline) => stale.push(listing.id),
                // gone upstream entirely
                Err(Error::Rejected(_)) => stale.push(listing.id),
                Err(Error::Unavailable(reason)) => {
                    warn!("skipping stale-check for {external_id}: {reason}");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if !stale.is_empty() {
            report.removed = crud::listings::delete_listings_by_ids(pool, &stale).await? as usize;
        }

        info!(
            removed = report.removed,
            skipped = report.skipped,
            "inventory cleanup finished"
        );
        Ok(report)
    }
}

/// Maps an advertised provider item into a local listing. The provider
/// only deals in socks5 endpoints.
pub fn listing_from_item(item: ProviderItem) -> NewListing {
    NewListing {
        origin: Origin::External,
        conn: ConnectionDescriptor::Socks5 {
            host: item.host,
            port: item.port,
            username: item.username,
            password: item.password,
        },
        location: Location {
            country: item.country,
            region: item.region,
            city: item.city,
            zip: item.zip,
        },
        price: item.price,
        external_id: Some(item.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_listing_from_item() {
        let item = ProviderItem {
            id: "ext-77".into(),
            host: "5.6.7.8".into(),
            port: 1080,
            username: "u".into(),
            password: "p".into(),
            country: Some("US".into()),
            region: None,
            city: Some("Dallas".into()),
            zip: None,
            price: Decimal::new(250, 2),
            status: 1,
        };

        let new = listing_from_item(item);
        assert_eq!(new.origin, Origin::External);
        assert_eq!(new.external_id.as_deref(), Some("ext-77"));
        assert_eq!(new.location.country.as_deref(), Some("US"));
        match new.conn {
            ConnectionDescriptor::Socks5 { host, port, .. } => {
                assert_eq!(host, "5.6.7.8");
                assert_eq!(port, 1080);
            }
            other => panic!("expected socks5 descriptor, got {other:?}"),
        }
    }
}
