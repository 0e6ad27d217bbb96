//! Domain types for the NCTR reward ledger.
//!
//! This module provides:
//! - Lossless amount handling via Decimal wrapper
//! - Domain primitives: TimeMs, UserId, WalletAddress, Email
//! - Portfolio, Lock and LedgerTransaction records
//! - Canonical commission events from partner webhooks
//! - Status level reference data

pub mod commission;
pub mod decimal;
pub mod lock;
pub mod portfolio;
pub mod primitives;
pub mod status;
pub mod transaction;

pub use commission::{CommissionEvent, CommissionStatus};
pub use decimal::{deserialize_amount, Decimal};
pub use lock::{Lock, LockCategory, LockStatus};
pub use portfolio::{ExternalSnapshot, Portfolio};
pub use primitives::{Email, PrimitiveParseError, TimeMs, UserId, WalletAddress, DAY_MS};
pub use status::StatusLevel;
pub use transaction::{Breakdown, EarningSource, LedgerTransaction, TransactionKind};
