pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{DataSource, DataSourceError, MockDataSource, PartnerDataSource, PartnerProfile};
pub use db::{init_db, Repository};
pub use domain::{
    Breakdown, Decimal, EarningSource, Email, LedgerTransaction, Lock, LockCategory, LockStatus,
    Portfolio, TimeMs, TransactionKind, UserId, WalletAddress,
};
pub use error::{AppError, LedgerError};
