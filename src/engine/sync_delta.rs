//! Delta computation for merging the external account into the ledger.
//!
//! Credit-only: decreases on the external side are clamped to zero and never
//! debited locally.

use crate::domain::{Decimal, ExternalSnapshot};
use serde::Serialize;

/// Credits implied by moving from a cached snapshot to a fresh one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDelta {
    pub credit_available: Decimal,
    pub credit_lock_three_sixty: Decimal,
}

impl SyncDelta {
    pub fn total(&self) -> Decimal {
        self.credit_available + self.credit_lock_three_sixty
    }

    pub fn is_empty(&self) -> bool {
        self.credit_available.is_zero() && self.credit_lock_three_sixty.is_zero()
    }
}

/// `lock360Delta = max(0, fresh.locked360 - cached.locked360)`,
/// `available = max(0, max(0, fresh.total - cached.total) - lock360Delta)`.
pub fn compute_sync_delta(cached: &ExternalSnapshot, fresh: &ExternalSnapshot) -> SyncDelta {
    let total_delta = (fresh.total - cached.total).clamp_non_negative();
    let lock_delta = (fresh.locked_three_sixty - cached.locked_three_sixty).clamp_non_negative();

    SyncDelta {
        credit_available: (total_delta - lock_delta).clamp_non_negative(),
        credit_lock_three_sixty: lock_delta,
    }
}
