use std::collections::HashSet;

use sqlx::{Error, PgExecutor, PgPool};

use crate::models::listings::{Listing, Location, NewListing, ProxyKind};

pub async fn add_listing<'e>(ex: impl PgExecutor<'e>, new: &NewListing) -> Result<Listing, Error> {
    sqlx::query_as::<_, Listing>(
        r#"
            INSERT INTO
            hawker_listings (origin, kind, host, port, username, password, country, region, city, zip, price, external_id)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id, origin, kind, host, port, username, password, country, region, city, zip, price, external_id, created_at
        "#,
    )
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
    .bind(new.price)
    .bind(&new.external_id)
    .fetch_one(ex)
    .await
}

pub async fn get_listing(pool: &PgPool, id: i32) -> Result<Option<Listing>, Error> {
    sqlx::query_as::<_, Listing>(
        r#"
            SELECT id, origin, kind, host, port, username, password, country, region, city, zip, price, external_id, created_at
            FROM hawker_listings
            WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_listing_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Listing>, Error> {
    sqlx::query_as::<_, Listing>(
        r#"
            SELECT id, origin, kind, host, port, username, password, country, region, city, zip, price, external_id, created_at
            FROM hawker_listings
            WHERE external_id = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await
}

/// Every external id currently present in inventory, loaded in one query.
/// Reconciliation seeds its in-run de-duplication set from this.
pub async fn external_ids(pool: &PgPool) -> Result<HashSet<String>, Error> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
            SELECT external_id
            FROM hawker_listings
            WHERE origin = 'external' AND external_id IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().collect())
}

pub async fn external_listings(pool: &PgPool) -> Result<Vec<Listing>, Error> {
    sqlx::query_as::<_, Listing>(
        r#"
            SELECT id, origin, kind, host, port, username, password, country, region, city, zip, price, external_id, created_at
            FROM hawker_listings
            WHERE origin = 'external'
            ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn query_listings(
    pool: &PgPool,
    kind: ProxyKind,
    filter: &Location,
    page: i64,
    page_size: i64,
) -> Result<(Vec<Listing>, i64), Error> {
    let listings = sqlx::query_as::<_, Listing>(
        r#"
            SELECT id, origin, kind, host, port, username, password, country, region, city, zip, price, external_id, created_at
            FROM hawker_listings
            WHERE kind = $1
            AND ($2::text IS NULL OR country = $2)
            AND ($3::text IS NULL OR region = $3)
            AND ($4::text IS NULL OR city = $4)
            AND ($5::text IS NULL OR zip = $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
        "#,
    )
    .bind(kind.to_string())
    .bind(&filter.country)
    .bind(&filter.region)
    .bind(&filter.city)
    .bind(&filter.zip)
    .bind(page_size)
    .bind(page * page_size)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
            SELECT count(*)
            FROM hawker_listings
            WHERE kind = $1
            AND ($2::text IS NULL OR country = $2)
            AND ($3::text IS NULL OR region = $3)
            AND ($4::text IS NULL OR city = $4)
            AND ($5::text IS NULL OR zip = $5)
        "#,
    )
    .bind(kind.to_string())
    .bind(&filter.country)
    .bind(&filter.region)
    .bind(&filter.city)
    .bind(&filter.zip)
    .fetch_one(pool)
    .await?;

    Ok((listings, total))
}

/// Listings a given user may be offered: location-filtered, minus hosts the
/// user already leases and minus hosts retired by the reclamation job. The
/// retired exclusion is deliberate even for freshly re-added listings.
pub async fn candidate_listings(
    pool: &PgPool,
    kind: ProxyKind,
    filter: &Location,
    user_id: i32,
) -> Result<Vec<Listing>, Error> {
    sqlx::query_as::<_, Listing>(
        r#"
            SELECT id, origin, kind, host, port, username, password, country, region, city, zip, price, external_id, created_at
            FROM hawker_listings
            WHERE kind = $1
            AND ($2::text IS NULL OR country = $2)
            AND ($3::text IS NULL OR region = $3)
            AND ($4::text IS NULL OR city = $4)
            AND ($5::text IS NULL OR zip = $5)
            AND host NOT IN (
                SELECT host FROM hawker_leases
                WHERE user_id = $6 AND NOT refunded
            )
            AND host NOT IN (
                SELECT host FROM hawker_leases
                WHERE resale = 'retired'
            )
        "#,
    )
    .bind(kind.to_string())
    .bind(&filter.country)
    .bind(&filter.region)
    .bind(&filter.city)
    .bind(&filter.zip)
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn host_exists(pool: &PgPool, host: &str) -> Result<bool, Error> {
    sqlx::query_scalar(
        r#"
            SELECT EXISTS(SELECT 1 FROM hawker_listings WHERE host = $1)
        "#,
    )
    .bind(host)
    .fetch_one(pool)
    .await
}

pub async fn delete_listings_by_ids(pool: &PgPool, ids: &[i32]) -> Result<u64, Error> {
    let res = sqlx::query(
        r#"
            DELETE FROM hawker_listings
            WHERE id = any($1)
        "#,
    )
    .bind(ids)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

/// Usable both standalone and inside the sale transaction that also
/// creates the lease.
pub async fn delete_listing<'e>(ex: impl PgExecutor<'e>, id: i32) -> Result<bool, Error> {
    let res = sqlx::query(
        r#"
            DELETE FROM hawker_listings
            WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(ex)
    .await?;

    Ok(res.rows_affected() > 0)
}
