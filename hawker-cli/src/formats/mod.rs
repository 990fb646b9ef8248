use hawker_core::models::listings::ConnectionDescriptor;

pub mod pptp;
pub mod socks5;

pub use pptp::PptpParser;
pub use socks5::Socks5Parser;

/// Parses one curated credentials-file format into connection descriptors.
pub trait ListingFileParser {
    fn parse_file(&self, content: &str) -> Vec<ConnectionDescriptor>;
}
