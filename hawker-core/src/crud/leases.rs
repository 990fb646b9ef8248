use chrono::{DateTime, Utc};
use sqlx::{Error, PgExecutor, PgPool};

use crate::models::leases::{Lease, NewLease, ResaleMarker};
use crate::models::listings::ProxyKind;

const LEASE_COLS: &str = "id, user_id, listing_id, origin, kind, host, port, username, password, country, region, city, zip, order_ref, price, purchased_at, expires_at, refunded, resale";

/// Inserts a lease row. Runs on whatever executor the caller provides so
/// the sale path can put it in the same transaction as the balance debit
/// and the listing deletion.
pub async fn create_lease<'e>(ex: impl PgExecutor<'e>, new: &NewLease) -> Result<Lease, Error> {
    let resale = match new.conn.kind() {
        ProxyKind::Pptp => Some(ResaleMarker::Pending.to_string()),
        ProxyKind::Socks5 => None,
    };

    sqlx::query_as::<_, Lease>(&format!(
        r#"
            INSERT INTO
            hawker_leases (user_id, listing_id, origin, kind, host, port, username, password, country, region, city, zip, order_ref, price, expires_at, refunded, resale)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, FALSE, $16)
            RETURNING {LEASE_COLS}
        "#
    ))
    .bind(new.user_id)
    .bind(new.listing_id)
    .bind(new.origin.to_string())
    .bind(new.conn.kind().to_string())
    .bind(new.conn.host())
    .bind(new.conn.port().map(i32::from))
    .bind(new.conn.username())
    .bind(new.conn.password())
    .bind(&new.location.country)
    .bind(&new.location.region)
    .bind(&new.location.city)
    .bind(&new.location.zip)
    .bind(&new.order_ref)
    .bind(new.price)
    .bind(new.expires_at)
    .bind(resale)
    .fetch_one(ex)
    .await
}

pub async fn get_lease(pool: &PgPool, id: i32) -> Result<Option<Lease>, Error> {
    sqlx::query_as::<_, Lease>(&format!(
        r#"
            SELECT {LEASE_COLS}
            FROM hawker_leases
            WHERE id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Marks a lease refunded and credits its price back to the owner, in one
/// transaction. The `NOT refunded` guard makes the second of two racing
/// refund attempts lose deterministically: it gets `None` and the balance
/// is credited exactly once.
pub async fn refund_lease(pool: &PgPool, id: i32) -> Result<Option<Lease>, Error> {
    let mut tx = pool.begin().await?;

    let lease = sqlx::query_as::<_, Lease>(&format!(
        r#"
            UPDATE hawker_leases
            SET refunded = TRUE
            WHERE id = $1 AND NOT refunded
            RETURNING {LEASE_COLS}
        "#
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let lease = match lease {
        Some(lease) => lease,
        None => return Ok(None),
    };

    sqlx::query(
        r#"
            UPDATE hawker_users
            SET balance = balance + $2
            WHERE id = $1
        "#,
    )
    .bind(lease.user_id)
    .bind(lease.price)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(lease))
}

/// Unrefunded leases of a kind purchased at or after `since`, excluding
/// hosts already retired. Feeds the auto-refund sweep.
pub async fn recent_leases(
    pool: &PgPool,
    kind: ProxyKind,
    since: DateTime<Utc>,
) -> Result<Vec<Lease>, Error> {
    sqlx::query_as::<_, Lease>(&format!(
        r#"
            SELECT {LEASE_COLS}
            FROM hawker_leases
            WHERE kind = $1
            AND purchased_at >= $2
            AND NOT refunded
            AND (resale IS NULL OR resale <> 'retired')
        "#
    ))
    .bind(kind.to_string())
    .bind(since)
    .fetch_all(pool)
    .await
}

/// Leases of a kind purchased before `before` whose resale marker is still
/// `pending`. Feeds the monthly reclamation job.
pub async fn reclaimable_leases(
    pool: &PgPool,
    kind: ProxyKind,
    before: DateTime<Utc>,
) -> Result<Vec<Lease>, Error> {
    sqlx::query_as::<_, Lease>(&format!(
        r#"
            SELECT {LEASE_COLS}
            FROM hawker_leases
            WHERE kind = $1
            AND purchased_at < $2
            AND resale = 'pending'
        "#
    ))
    .bind(kind.to_string())
    .bind(before)
    .fetch_all(pool)
    .await
}

pub async fn set_resale_marker(pool: &PgPool, id: i32, marker: ResaleMarker) -> Result<(), Error> {
    sqlx::query(
        r#"
            UPDATE hawker_leases
            SET resale = $2
            WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(marker.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Operator override: permanently retires every lease on a host.
pub async fn retire_host(pool: &PgPool, host: &str) -> Result<u64, Error> {
    let res = sqlx::query(
        r#"
            UPDATE hawker_leases
            SET resale = 'retired'
            WHERE host = $1 AND resale IS NOT NULL AND resale <> 'retired'
        "#,
    )
    .bind(host)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

pub async fn extend_lease(pool: &PgPool, id: i32, hours: i32) -> Result<Option<Lease>, Error> {
    sqlx::query_as::<_, Lease>(&format!(
        r#"
            UPDATE hawker_leases
            SET expires_at = expires_at + ($2 * interval '1 hour')
            WHERE id = $1
            RETURNING {LEASE_COLS}
        "#
    ))
    .bind(id)
    .bind(hours)
    .fetch_optional(pool)
    .await
}
