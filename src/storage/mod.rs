mod catalog_store;
mod counterparty_store;
mod cursor;
mod error;
mod ledger_store;
mod repository;
mod stores;
mod traits;

pub use cursor::*;
pub use error::*;
pub use repository::*;
pub use stores::*;
pub use traits::*;

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
