use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::listings::{
    conn_from_row, location_from_row, parse_column, ConnectionDescriptor, Location, Origin,
    ProxyKind,
};
use super::UnknownVariant;

/// Whether an expired PPTP lease's host may be offered for sale again.
/// `Retired` is absorbing: a retired host is never offered again, even if
/// it later comes back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResaleMarker {
    Pending,
    Resaleable,
    Retired,
}

impl fmt::Display for ResaleMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResaleMarker::Pending => write!(f, "pending"),
            ResaleMarker::Resaleable => write!(f, "resaleable"),
            ResaleMarker::Retired => write!(f, "retired"),
        }
    }
}

impl FromStr for ResaleMarker {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResaleMarker::Pending),
            "resaleable" => Ok(ResaleMarker::Resaleable),
            "retired" => Ok(ResaleMarker::Retired),
            other => Err(UnknownVariant {
                column: "resale",
                value: other.into(),
            }),
        }
    }
}

/// A sold, time-bounded grant of a proxy to a user. The connection
/// descriptor is a snapshot taken at sale time and never changes, even
/// after the originating listing is deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub id: i32,
    pub user_id: i32,
    /// Originating listing. Nullable for audit purposes: the listing row is
    /// deleted in the same transaction that creates the lease.
    pub listing_id: Option<i32>,
    pub origin: Origin,
    pub conn: ConnectionDescriptor,
    pub location: Location,
    /// Provider order id for external leases, a generated reference for
    /// curated ones.
    pub order_ref: String,
    pub price: Decimal,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refunded: bool,
    /// `Some` only for PPTP leases.
    pub resale: Option<ResaleMarker>,
}

impl Lease {
    pub fn kind(&self) -> ProxyKind {
        self.conn.kind()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLease {
    pub user_id: i32,
    pub listing_id: Option<i32>,
    pub origin: Origin,
    pub conn: ConnectionDescriptor,
    pub location: Location,
    pub order_ref: String,
    pub price: Decimal,
    pub expires_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Lease {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let resale: Option<String> = row.try_get("resale")?;
        let resale = match resale {
            Some(raw) => Some(raw.parse::<ResaleMarker>().map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "resale".into(),
                    source: Box::new(e),
                }
            })?),
            None => None,
        };

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            listing_id: row.try_get("listing_id")?,
            origin: parse_column(row, "origin")?,
            conn: conn_from_row(row)?,
            location: location_from_row(row)?,
            order_ref: row.try_get("order_ref")?,
            price: row.try_get("price")?,
            purchased_at: row.try_get("purchased_at")?,
            expires_at: row.try_get("expires_at")?,
            refunded: row.try_get("refunded")?,
            resale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resale_marker_round_trip() {
        for marker in [
            ResaleMarker::Pending,
            ResaleMarker::Resaleable,
            ResaleMarker::Retired,
        ] {
            assert_eq!(marker.to_string().parse::<ResaleMarker>().unwrap(), marker);
        }
        assert!("recycled".parse::<ResaleMarker>().is_err());
    }
}
