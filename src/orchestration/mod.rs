//! Services that sequence engine rules, storage and the partner data source.

pub mod credit;
pub mod locks;
pub mod payload;
pub mod rate_limit;
pub mod reconcile;
pub mod signature;
pub mod webhook;

pub use credit::{CreditOutcome, CreditRequest, CreditService};
pub use locks::{LockService, SweepReport};
pub use payload::{normalize, InboundEvent, PayloadError};
pub use rate_limit::CooldownLimiter;
pub use reconcile::{Reconciler, SyncCredits, SyncStatus};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
pub use webhook::{TransitionDisposition, TransitionResult, WebhookIngestor, WebhookOutcome};
