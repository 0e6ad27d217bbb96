//! Pure computation engine(s) for deterministic ledger logic.
//!
//! Nothing here performs I/O: split allocation, tier derivation, reconciliation
//! deltas and lock transition rules are all plain functions over domain types.

pub mod lock_rules;
pub mod split;
pub mod sync_delta;
pub mod tier;

pub use lock_rules::{check_release, plan_upgrade, validate_commitment, LockMinimums};
pub use split::{split_with, SplitPolicyTable, SplitWeights, SPLIT_DECIMALS};
pub use sync_delta::{compute_sync_delta, SyncDelta};
pub use tier::{tier_for, NextTier, TierStanding};
