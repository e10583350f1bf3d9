//! Read-mostly query layer over the OMI tables
//!
//! Zone, quotation, and semester queries are read-only; the OMI tables are
//! bulk-loaded per semester by the importer and never mutated here. Only
//! `transactions` (user-maintained comparables) has a write surface.

mod quotations;
mod transactions;
mod zones;

pub use quotations::{prevalent_price_bands, quotations_for, quotations_for_zone};
pub use transactions::{
    comparables_for, delete_transaction, get_transaction, insert_transaction, list_transactions,
    update_transaction, TransactionChanges,
};
pub use zones::{distinct_semesters, latest_semester, zone_rows_for_semester};
