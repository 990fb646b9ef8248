use std::fmt::Display;

use hawker_core::models::listings::Listing;
use tabled::builder;

pub struct ListingTable(pub Vec<Listing>);

impl Display for ListingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = builder::Builder::new();
        builder.push_record(["id", "origin", "kind", "host", "country", "price"]);
        for listing in &self.0 {
            builder.push_record([
                &listing.id.to_string(),
                &listing.origin.to_string(),
                &listing.kind().to_string(),
                &listing.conn.host().to_string(),
                &listing.location.country.clone().unwrap_or_default(),
                &listing.price.to_string(),
            ]);
        }

        let table = builder.build().to_string();
        write!(f, "{}", table)
    }
}
