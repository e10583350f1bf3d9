//! Database access layer: schema initialization and row models

mod init;
mod models;

pub use init::{create_schema, init_database};
pub use models::{GeocodeCacheEntry, Quotation, Transaction, ZoneRecord};
