//! SQLite backend for the Cornerstone building-record store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every structural operation runs the
//! core engine inside one `IMMEDIATE` transaction on that thread.

mod encode;
mod ledger;
mod schema;
mod store;

pub mod error;
pub mod settings;

pub use error::{Error, Result};
pub use settings::StoreConfig;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
