//! Canonical commission event produced by webhook normalisation.

use crate::domain::{Decimal, UserId};
use serde::{Deserialize, Serialize};

/// Partner-side lifecycle of a commission, collapsed to what the ledger acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    /// Not yet payable; stored and acknowledged.
    Pending,
    /// Completed or paid out; creditable.
    Completed,
    /// Cancelled, declined or reversed; never credited.
    Rejected,
    /// Anything else; acknowledged, not actionable.
    Unrecognized,
}

impl CommissionStatus {
    /// Map a partner status string.
    pub fn from_external(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "paid" | "approved" | "confirmed" | "available"
            | "available_for_payout" | "locked" => CommissionStatus::Completed,
            "pending" | "processing" | "open" | "new" => CommissionStatus::Pending,
            "cancelled" | "canceled" | "declined" | "rejected" | "refunded" | "reversed" => {
                CommissionStatus::Rejected
            }
            _ => CommissionStatus::Unrecognized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Completed => "completed",
            CommissionStatus::Rejected => "rejected",
            CommissionStatus::Unrecognized => "unrecognized",
        }
    }
}

impl std::str::FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommissionStatus::Pending),
            "completed" => Ok(CommissionStatus::Completed),
            "rejected" => Ok(CommissionStatus::Rejected),
            "unrecognized" => Ok(CommissionStatus::Unrecognized),
            other => Err(format!("unknown commission status: {}", other)),
        }
    }
}

/// `{externalEventId, userId, amount, sourceBrand, status}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionEvent {
    pub external_event_id: String,
    pub user_id: UserId,
    pub amount: Decimal,
    pub source_brand: String,
    pub status: CommissionStatus,
}
