use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hawker_core::crud;
use hawker_core::models::leases::{Lease, NewLease, ResaleMarker};
use hawker_core::models::listings::{ConnectionDescriptor, Listing, Location, Origin, ProxyKind};
use rand::seq::SliceRandom;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::probe::Prober;
use crate::provider::ProviderClient;

/// How long a fresh lease runs before it expires.
pub fn lease_duration(kind: ProxyKind) -> Duration {
    match kind {
        ProxyKind::Socks5 => Duration::hours(24),
        ProxyKind::Pptp => Duration::days(30),
    }
}

/// True while a refund may still be granted. The boundary minute itself is
/// inside the window.
pub fn is_refund_eligible(
    purchased_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window_minutes: i64,
) -> bool {
    now - purchased_at <= Duration::minutes(window_minutes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    pub online: bool,
    pub refund_eligible: bool,
}

/// Orchestrates the sale path: candidate selection, liveness validation,
/// and the atomic commit that debits the buyer, creates the lease, and
/// deletes the consumed listing, all or nothing.
pub struct PurchaseCoordinator {
    provider: Arc<ProviderClient>,
    prober: Arc<Prober>,
    refund_window_minutes: i64,
}

impl PurchaseCoordinator {
    pub fn new(
        provider: Arc<ProviderClient>,
        prober: Arc<Prober>,
        refund_window_minutes: i64,
    ) -> Self {
        Self {
            provider,
            prober,
            refund_window_minutes,
        }
    }

    /// Sells a specific listing to a user. External-origin listings are
    /// bought upstream first: a provider refusal aborts with zero local
    /// side effects, an unreachable provider aborts retryably. The
    /// credentials handed back by the upstream buy, not the advertised
    /// ones, become the lease snapshot.
    pub async fn purchase_direct(
        &self,
        pool: &PgPool,
        user_id: i32,
        listing_id: i32,
    ) -> Result<Lease> {
        let listing = crud::listings::get_listing(pool, listing_id)
            .await?
            .ok_or(Error::NotFound)?;

        let balance = crud::users::get_balance(pool, user_id)
            .await?
            .ok_or(Error::NotFound)?;
        if balance < listing.price {
            return Err(Error::InsufficientFunds);
        }

        let (conn, order_ref) = match (listing.origin, &listing.external_id) {
            (Origin::External, Some(external_id)) => {
                let creds = self.provider.buy(external_id).await?;
                (
                    ConnectionDescriptor::Socks5 {
                        host: creds.host,
                        port: creds.port,
                        username: creds.username,
                        password: creds.password,
                    },
                    creds.order_id,
                )
            }
            _ => (listing.conn.clone(), Uuid::new_v4().to_string()),
        };

        self.commit_sale(pool, user_id, &listing, conn, order_ref).await
    }

    /// Sells the first live candidate matching the filters. Used for
    /// curated PPTP, where the catalog says nothing about liveness.
    /// Candidates already leased by this user and candidates on retired
    /// hosts never enter the pool; the rest are shuffled so catalog order
    /// carries no weight.
    pub async fn purchase_by_filter(
        &self,
        pool: &PgPool,
        user_id: i32,
        kind: ProxyKind,
        filter: &Location,
    ) -> Result<Lease> {
        let mut candidates = crud::listings::candidate_listings(pool, kind, filter, user_id).await?;
        let cheapest = match candidates.iter().map(|l| l.price).min() {
            Some(price) => price,
            None => return Err(Error::NoneAvailable),
        };

        // first of two balance checks; the debit at commit re-verifies,
        // since the validation loop below can be slow
        let balance = crud::users::get_balance(pool, user_id)
            .await?
            .ok_or(Error::NotFound)?;
        if balance < cheapest {
            return Err(Error::InsufficientFunds);
        }

        candidates.shuffle(&mut rand::thread_rng());
        let live = self.prune_dead_candidates(pool, candidates).await?;
        let listing = select_first(&live).ok_or(Error::NoneAvailable)?.clone();

        self.commit_sale(
            pool,
            user_id,
            &listing,
            listing.conn.clone(),
            Uuid::new_v4().to_string(),
        )
        .await
    }

    /// Probes candidates in order, deleting every offline listing on the
    /// spot: validation doubles as dead-stock pruning, and the pruning is
    /// kept even when the overall purchase fails. Stops at the first
    /// online candidate; anything after it is returned unprobed as part of
    /// the live set.
    async fn prune_dead_candidates(
        &self,
        pool: &PgPool,
        candidates: Vec<Listing>,
    ) -> Result<Vec<Listing>> {
        let mut live = Vec::new();
        let mut rest = candidates.into_iter();

        while let Some(listing) = rest.next() {
            let outcome = self.prober.check(&listing.conn).await;
            if outcome.online {
                live.push(listing);
                live.extend(rest);
                break;
            }
            crud::listings::delete_listing(pool, listing.id).await?;
            info!(
                listing = listing.id,
                host = listing.conn.host(),
                reason = outcome.reason.as_deref().unwrap_or(""),
                "pruned dead listing during purchase validation"
            );
        }

        Ok(live)
    }

    /// The single commit both flows end in: debit, lease, delete listing.
    /// No other transaction ever observes a listing and its lease
    /// coexisting, which is what enforces at-most-one-sale.
    async fn commit_sale(
        &self,
        pool: &PgPool,
        user_id: i32,
        listing: &Listing,
        conn: ConnectionDescriptor,
        order_ref: String,
    ) -> Result<Lease> {
        let expires_at = Utc::now() + lease_duration(conn.kind());
        let mut tx = pool.begin().await?;

        if !crud::users::debit_balance(&mut *tx, user_id, listing.price).await? {
            return Err(Error::InsufficientFunds);
        }
        let lease = crud::leases::create_lease(
            &mut *tx,
            &NewLease {
                user_id,
                listing_id: Some(listing.id),
                origin: listing.origin,
                conn,
                location: listing.location.clone(),
                order_ref,
                price: listing.price,
                expires_at,
            },
        )
        .await?;
        crud::listings::delete_listing(&mut *tx, listing.id).await?;

        tx.commit().await?;
        info!(
            lease = lease.id,
            user = user_id,
            listing = listing.id,
            price = %listing.price,
            "lease sold"
        );
        Ok(lease)
    }

    /// Probes a lease's endpoint and reports whether a refund would be
    /// granted right now.
    pub async fn validate(&self, pool: &PgPool, lease_id: i32) -> Result<ValidationReport> {
        let lease = crud::leases::get_lease(pool, lease_id)
            .await?
            .ok_or(Error::NotFound)?;
        let outcome = self.prober.check(&lease.conn).await;

        let refund_eligible = if lease.refunded {
            false
        } else {
            match lease.origin {
                Origin::External => self.provider.refund_eligible(&lease.order_ref).await?,
                Origin::Curated => {
                    !outcome.online
                        && is_refund_eligible(
                            lease.purchased_at,
                            Utc::now(),
                            self.refund_window_minutes,
                        )
                }
            }
        };

        Ok(ValidationReport {
            online: outcome.online,
            refund_eligible,
        })
    }

    /// User-triggered refund. External leases defer eligibility to the
    /// provider and refund upstream before crediting locally; curated
    /// leases require the window to still be open and the endpoint to
    /// probe offline. Asking twice is a hard error; the credit already
    /// happened.
    pub async fn refund(&self, pool: &PgPool, lease_id: i32) -> Result<Lease> {
        let lease = crud::leases::get_lease(pool, lease_id)
            .await?
            .ok_or(Error::NotFound)?;
        if lease.refunded {
            return Err(Error::AlreadyRefunded);
        }

        match lease.origin {
            Origin::External => {
                if !self.provider.refund_eligible(&lease.order_ref).await? {
                    return Err(Error::Rejected("order is not refundable".into()));
                }
                self.provider.refund(&lease.order_ref).await?;
            }
            Origin::Curated => {
                if !is_refund_eligible(lease.purchased_at, Utc::now(), self.refund_window_minutes) {
                    return Err(Error::Rejected("refund window elapsed".into()));
                }
                let outcome = self.prober.check(&lease.conn).await;
                if outcome.online {
                    return Err(Error::Rejected("proxy is reachable".into()));
                }
            }
        }

        // a concurrent auto-refund may have won the race since the read
        let lease = crud::leases::refund_lease(pool, lease_id)
            .await?
            .ok_or(Error::AlreadyRefunded)?;
        info!(lease = lease.id, user = lease.user_id, "lease refunded");
        Ok(lease)
    }

    /// Pushes a lease's expiry out by `hours`, but only while the
    /// underlying endpoint still probes live.
    pub async fn extend(&self, pool: &PgPool, lease_id: i32, hours: i32) -> Result<Lease> {
        let lease = crud::leases::get_lease(pool, lease_id)
            .await?
            .ok_or(Error::NotFound)?;
        if lease.refunded {
            return Err(Error::AlreadyRefunded);
        }
        if lease.resale == Some(ResaleMarker::Retired) {
            return Err(Error::AlreadyRetired);
        }

        let outcome = self.prober.check(&lease.conn).await;
        if !outcome.online {
            return Err(Error::Rejected("proxy is not reachable".into()));
        }

        let lease = crud::leases::extend_lease(pool, lease_id, hours)
            .await?
            .ok_or(Error::NotFound)?;
        info!(lease = lease.id, hours, "lease extended");
        Ok(lease)
    }
}

fn select_first(live: &[Listing]) -> Option<&Listing> {
    live.first()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_refund_window_boundary() {
        let purchased = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let at_window = purchased + Duration::minutes(60);
        let past_window = purchased + Duration::minutes(61);

        assert!(is_refund_eligible(purchased, purchased, 60));
        assert!(is_refund_eligible(purchased, at_window, 60));
        assert!(!is_refund_eligible(purchased, past_window, 60));
    }

    #[test]
    fn test_lease_durations() {
        assert_eq!(lease_duration(ProxyKind::Socks5), Duration::hours(24));
        assert_eq!(lease_duration(ProxyKind::Pptp), Duration::days(30));
    }
}
