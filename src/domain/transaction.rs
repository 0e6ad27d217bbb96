//! Append-only ledger audit records.

use crate::domain::{Decimal, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earned,
    Locked,
    Upgraded,
    Purchased,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earned => "earned",
            TransactionKind::Locked => "locked",
            TransactionKind::Upgraded => "upgraded",
            TransactionKind::Purchased => "purchased",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(TransactionKind::Earned),
            "locked" => Ok(TransactionKind::Locked),
            "upgraded" => Ok(TransactionKind::Upgraded),
            "purchased" => Ok(TransactionKind::Purchased),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

/// Where a balance change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarningSource {
    AffiliatePurchase,
    Referral,
    NctrLiveSync,
    DailyCheckin,
    TokenPurchase,
    Manual,
    /// User-initiated moves between buckets (commitments, upgrades, releases).
    LockCommitment,
}

impl EarningSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EarningSource::AffiliatePurchase => "affiliate_purchase",
            EarningSource::Referral => "referral",
            EarningSource::NctrLiveSync => "nctr_live_sync",
            EarningSource::DailyCheckin => "daily_checkin",
            EarningSource::TokenPurchase => "token_purchase",
            EarningSource::Manual => "manual",
            EarningSource::LockCommitment => "lock_commitment",
        }
    }

    /// Sources whose credits are scaled by the owner's tier multiplier.
    pub fn earns_multiplier(&self) -> bool {
        matches!(self, EarningSource::AffiliatePurchase)
    }
}

impl std::fmt::Display for EarningSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EarningSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "affiliate_purchase" => Ok(EarningSource::AffiliatePurchase),
            "referral" => Ok(EarningSource::Referral),
            "nctr_live_sync" => Ok(EarningSource::NctrLiveSync),
            "daily_checkin" => Ok(EarningSource::DailyCheckin),
            "token_purchase" => Ok(EarningSource::TokenPurchase),
            "manual" => Ok(EarningSource::Manual),
            "lock_commitment" => Ok(EarningSource::LockCommitment),
            other => Err(format!("unknown earning source: {}", other)),
        }
    }
}

/// Per-bucket allocation of a credited amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub available: Decimal,
    pub lock_ninety: Decimal,
    pub lock_three_sixty: Decimal,
}

impl Breakdown {
    pub fn total(&self) -> Decimal {
        self.available + self.lock_ninety + self.lock_three_sixty
    }
}

/// One row of the audit trail. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    pub owner: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    /// Amount as received, before any tier multiplier.
    pub gross_amount: Decimal,
    pub breakdown: Breakdown,
    pub description: String,
    /// Idempotency key; unique per source when present.
    pub external_event_id: Option<String>,
    pub source: EarningSource,
    pub policy_version: Option<u32>,
    pub created_at: TimeMs,
}
