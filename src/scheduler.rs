use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use hawker_core::crud;
use hawker_core::models::leases::ResaleMarker;
use hawker_core::models::listings::{Location, NewListing, Origin, ProxyKind};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::error::Result;
use crate::probe::Prober;
use crate::sync::Reconciler;

/// Hour of day (UTC) the reclamation job runs on the 1st of each month.
const RECLAIM_HOUR: u32 = 3;

/// Drives the three periodic jobs. Each job body runs start-to-finish
/// inside its own loop task, and missed ticks are skipped, so a tick that
/// arrives while the previous run is still going never stacks a second
/// instance. Jobs swallow their errors at the top: there is nobody to
/// report to, and the next tick is the retry.
pub struct Scheduler {
    pool: PgPool,
    reconciler: Arc<Reconciler>,
    prober: Arc<Prober>,
    sync_interval: StdDuration,
    refund_sweep_interval: StdDuration,
    refund_window_minutes: i64,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        reconciler: Arc<Reconciler>,
        prober: Arc<Prober>,
        sync_interval: StdDuration,
        refund_sweep_interval: StdDuration,
        refund_window_minutes: i64,
    ) -> Self {
        Self {
            pool,
            reconciler,
            prober,
            sync_interval,
            refund_sweep_interval,
            refund_window_minutes,
            tasks: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        {
            let pool = self.pool.clone();
            let reconciler = Arc::clone(&self.reconciler);
            let every = self.sync_interval;
            self.tasks.push(tokio::spawn(async move {
                let mut ticks = interval(every);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticks.tick().await;
                    if let Err(e) = run_sync(&pool, &reconciler).await {
                        error!("inventory sync job failed: {e}");
                    }
                }
            }));
        }

        {
            let pool = self.pool.clone();
            let prober = Arc::clone(&self.prober);
            let every = self.refund_sweep_interval;
            let window = self.refund_window_minutes;
            self.tasks.push(tokio::spawn(async move {
                let mut ticks = interval(every);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticks.tick().await;
                    if let Err(e) = run_refund_sweep(&pool, &prober, window).await {
                        error!("refund sweep failed: {e}");
                    }
                }
            }));
        }

        {
            let pool = self.pool.clone();
            let prober = Arc::clone(&self.prober);
            self.tasks.push(tokio::spawn(async move {
                loop {
                    tokio::time::sleep(until_next_reclaim(Utc::now())).await;
                    if let Err(e) = run_reclamation(&pool, &prober).await {
                        error!("monthly reclamation failed: {e}");
                    }
                }
            }));
        }

        info!("scheduler started");
    }

    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// One reconciliation cycle: pull, then retire stale entries. The cleanup
/// is skipped when the pull already found the provider unreachable.
pub async fn run_sync(pool: &PgPool, reconciler: &Reconciler) -> Result<()> {
    let report = reconciler.sync(pool, &Location::default()).await?;
    if report.error.is_none() {
        reconciler.cleanup(pool).await?;
    }
    Ok(())
}

/// One auto-refund sweep: PPTP leases bought within the window, probed in
/// bulk; whoever's endpoint is down gets the money back. A lease refunded
/// concurrently elsewhere is left alone: the guard in the ledger makes
/// the second attempt a no-op.
pub async fn run_refund_sweep(pool: &PgPool, prober: &Prober, window_minutes: i64) -> Result<usize> {
    let since = Utc::now() - Duration::minutes(window_minutes);
    let leases = crud::leases::recent_leases(pool, ProxyKind::Pptp, since).await?;
    if leases.is_empty() {
        return Ok(0);
    }

    let targets = leases.iter().map(|l| (l.id, l.conn.clone())).collect();
    let mut refunded = 0;
    for (id, outcome) in prober.batch(targets).await {
        if outcome.online {
            continue;
        }
        if let Some(lease) = crud::leases::refund_lease(pool, id).await? {
            refunded += 1;
            info!(
                lease = id,
                user = lease.user_id,
                "auto-refunded dead pptp lease"
            );
        }
    }

    if refunded > 0 {
        info!(refunded, "refund sweep finished");
    }
    Ok(refunded)
}

/// Monthly reclamation: PPTP leases past the resale age still awaiting a
/// verdict. Hosts that probe online go back on the shelf unless a listing
/// with that host already exists; dead hosts are retired permanently.
pub async fn run_reclamation(pool: &PgPool, prober: &Prober) -> Result<(usize, usize)> {
    let cutoff = Utc::now() - Duration::days(30);
    let leases = crud::leases::reclaimable_leases(pool, ProxyKind::Pptp, cutoff).await?;
    let mut returned = 0;
    let mut retired = 0;

    for lease in leases {
        let outcome = prober.check(&lease.conn).await;
        if outcome.online {
            if !crud::listings::host_exists(pool, lease.conn.host()).await? {
                crud::listings::add_listing(
                    pool,
                    &NewListing {
                        origin: Origin::Curated,
                        conn: lease.conn.clone(),
                        location: lease.location.clone(),
                        price: lease.price,
                        external_id: None,
                    },
                )
                .await?;
            }
            crud::leases::set_resale_marker(pool, lease.id, ResaleMarker::Resaleable).await?;
            returned += 1;
        } else {
            crud::leases::set_resale_marker(pool, lease.id, ResaleMarker::Retired).await?;
            retired += 1;
            info!(
                lease = lease.id,
                host = lease.conn.host(),
                "retired dead pptp host"
            );
        }
    }

    info!(returned, retired, "monthly reclamation finished");
    Ok((returned, retired))
}

/// Time until the next 1st-of-month reclamation instant.
pub fn until_next_reclaim(now: DateTime<Utc>) -> StdDuration {
    let this_month = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, RECLAIM_HOUR, 0, 0)
        .single()
        .expect("valid reclaim instant");

    let target = if now < this_month {
        this_month
    } else {
        let (year, month) = if now.month() == 12 {
            (now.year() + 1, 1)
        } else {
            (now.year(), now.month() + 1)
        };
        Utc.with_ymd_and_hms(year, month, 1, RECLAIM_HOUR, 0, 0)
            .single()
            .expect("valid reclaim instant")
    };

    (target - now).to_std().unwrap_or(StdDuration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaim_instant_mid_month() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let wait = until_next_reclaim(now);
        let target = now + Duration::from_std(wait).unwrap();
        assert_eq!(target, Utc.with_ymd_and_hms(2024, 4, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_reclaim_instant_early_on_the_first() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
        let wait = until_next_reclaim(now);
        let target = now + Duration::from_std(wait).unwrap();
        assert_eq!(target, Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_reclaim_instant_year_rollover() {
        let now = Utc.with_ymd_and_hms(2024, 12, 20, 4, 0, 0).unwrap();
        let wait = until_next_reclaim(now);
        let target = now + Duration::from_std(wait).unwrap();
        assert_eq!(target, Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap());
    }
}
