//! Per-user balances and the cached mirror of the external account.

use crate::domain::{Decimal, TimeMs, UserId, WalletAddress};
use serde::{Deserialize, Serialize};

/// Last-known balances of the external system of record.
///
/// Only used to compute deltas on the next reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSnapshot {
    pub available: Decimal,
    pub locked_three_sixty: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub user_id: UserId,
    pub available: Decimal,
    pub locked_ninety: Decimal,
    pub locked_three_sixty: Decimal,
    /// Lifetime credits. Never decreases.
    pub total_earned: Decimal,
    pub linked_wallet: Option<WalletAddress>,
    pub external_snapshot: ExternalSnapshot,
    pub external_verified: bool,
    pub last_sync_at: Option<TimeMs>,
    pub last_sync_error: Option<String>,
}

impl Portfolio {
    /// The all-zero portfolio reported for users with no ledger activity.
    pub fn empty(user_id: UserId) -> Self {
        Portfolio {
            user_id,
            available: Decimal::zero(),
            locked_ninety: Decimal::zero(),
            locked_three_sixty: Decimal::zero(),
            total_earned: Decimal::zero(),
            linked_wallet: None,
            external_snapshot: ExternalSnapshot::default(),
            external_verified: false,
            last_sync_at: None,
            last_sync_error: None,
        }
    }

    /// `available + lockedNinety + lockedThreeSixty <= totalEarned`, all non-negative.
    pub fn is_consistent(&self) -> bool {
        let buckets = [self.available, self.locked_ninety, self.locked_three_sixty];
        buckets.iter().all(|b| !b.is_negative())
            && buckets.iter().copied().sum::<Decimal>() <= self.total_earned
    }
}
