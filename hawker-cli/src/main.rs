mod formats;
mod listing_table;

use std::fs;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use hawker::config::Config;
use hawker::provider::ProviderClient;
use hawker::sync::Reconciler;
use hawker_core::crud::{leases, listings};
use hawker_core::models::listings::{Location, NewListing, Origin, ProxyKind};
use rust_decimal::Decimal;

use crate::formats::{ListingFileParser, PptpParser, Socks5Parser};
use crate::listing_table::ListingTable;

#[derive(Debug, Parser)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// A subcommand for bulk-loading curated proxies from a file
    Import {
        file: String,

        #[arg(short, long)]
        kind: KindArg,

        /// Sale price applied to every imported listing
        #[arg(short, long)]
        price: Decimal,

        #[arg(short, long)]
        country: Option<String>,
    },
    /// A subcommand for querying existing inventory
    Query {
        #[arg(short, long)]
        kind: KindArg,

        #[arg(short, long)]
        country: Option<String>,

        /// Look one listing up by its upstream marketplace id instead
        #[arg(long)]
        external_id: Option<String>,

        #[arg(long, default_value_t = 0)]
        page: i64,

        #[arg(long, default_value_t = 50)]
        page_size: i64,
    },
    /// Pull the provider's current supply into inventory now
    Sync {
        #[arg(short, long)]
        country: Option<String>,
    },
    /// Drop external listings the provider no longer reports live
    Cleanup,
    /// Permanently retire every lease on a host
    RetireHost { host: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Socks5,
    Pptp,
}

impl From<KindArg> for ProxyKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Socks5 => ProxyKind::Socks5,
            KindArg::Pptp => ProxyKind::Pptp,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let db_pool = hawker_core::new_pool().await.expect("error creating db pool");
    match cli.command {
        Command::Import {
            file,
            kind,
            price,
            country,
        } => {
            let content = fs::read_to_string(file).expect("error reading import file");
            let parser: Box<dyn ListingFileParser> = match kind {
                KindArg::Socks5 => Box::new(Socks5Parser),
                KindArg::Pptp => Box::new(PptpParser),
            };
            let conns = parser.parse_file(&content);
            let n_listings = conns.len();
            let location = country.map(Location::country).unwrap_or_default();

            for conn in conns {
                listings::add_listing(
                    &db_pool,
                    &NewListing {
                        origin: Origin::Curated,
                        conn,
                        location: location.clone(),
                        price,
                        external_id: None,
                    },
                )
                .await
                .expect("error adding listing");
            }
            println!("Successfully added {} listings!", n_listings);
        }
        Command::Query {
            kind,
            country,
            external_id,
            page,
            page_size,
        } => {
            if let Some(external_id) = external_id {
                let listing = listings::get_listing_by_external_id(&db_pool, &external_id)
                    .await
                    .expect("error fetching listing");
                let table = ListingTable(listing.into_iter().collect());
                println!("{}", table);
                return;
            }
            let filter = country.map(Location::country).unwrap_or_default();
            let (items, total) =
                listings::query_listings(&db_pool, kind.into(), &filter, page, page_size)
                    .await
                    .expect("error fetching listings");
            let table = ListingTable(items);
            println!("{}", table);
            println!("{} total", total);
        }
        Command::Sync { country } => {
            let filter = country.map(Location::country).unwrap_or_default();
            let report = reconciler_from_env()
                .sync(&db_pool, &filter)
                .await
                .expect("error running sync");
            println!(
                "fetched {} added {} skipped {} over {} pages",
                report.fetched, report.added, report.skipped, report.pages
            );
            if let Some(err) = report.error {
                println!("aborted early: {}", err);
            }
        }
        Command::Cleanup => {
            let report = reconciler_from_env()
                .cleanup(&db_pool)
                .await
                .expect("error running cleanup");
            println!(
                "examined {} removed {} skipped {}",
                report.examined, report.removed, report.skipped
            );
        }
        Command::RetireHost { host } => {
            let n = leases::retire_host(&db_pool, &host)
                .await
                .expect("error retiring host");
            println!("Retired {} leases on {}", n, host);
        }
    }
}

fn reconciler_from_env() -> Reconciler {
    let cfg = Config::from_env();
    let provider = Arc::new(
        ProviderClient::new(
            cfg.provider_base_url.clone(),
            cfg.provider_token.clone(),
            cfg.provider_timeout,
        )
        .expect("error building provider client"),
    );
    Reconciler::new(provider, cfg.sync_page_size, cfg.sync_page_cap)
}
