//! Core types and the merge engine for the Cornerstone building-record store.
//!
//! A building record is never edited in place. Every ingestion, merge, and
//! user edit produces a new immutable [`Snapshot`](snapshot::Snapshot); the
//! snapshots form a DAG, and one [`Lineage`](lineage::Lineage) per building
//! points at the snapshot currently considered its truth.
//!
//! This crate has no database dependencies. Storage backends
//! implement [`Ledger`](ledger::Ledger) for the engine and
//! [`BuildingStore`](store::BuildingStore) for callers.

pub mod attribute;
pub mod column;
pub mod edit;
pub mod engine;
pub mod error;
pub mod flat;
pub mod ledger;
pub mod lineage;
pub mod memory;
pub mod policy;
pub mod settings;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
