pub mod leases;
pub mod listings;
pub mod users;
