//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - Connection options (busy timeout, pool size)
//! - Repository layer: portfolios, locks, the transaction audit trail,
//!   tracking links and pending commissions

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, open_store, StoreOptions};
pub use repo::{
    CreditApplied, CreditRecord, PendingCommission, Repository, SyncApplied, UpgradeApplied,
};
pub(crate) use repo::verify_replay;
