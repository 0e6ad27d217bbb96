//! Time-locked commitments.

use crate::domain::{Decimal, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lock bucket. The 360-day bucket drives status tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockCategory {
    NinetyDay,
    ThreeSixtyDay,
}

impl LockCategory {
    /// Commitment length in days.
    pub fn commitment_days(&self) -> u32 {
        match self {
            LockCategory::NinetyDay => 90,
            LockCategory::ThreeSixtyDay => 360,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockCategory::NinetyDay => "ninety_day",
            LockCategory::ThreeSixtyDay => "three_sixty_day",
        }
    }
}

impl std::fmt::Display for LockCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockCategory {
    type Err = String;

    /// Accepts the canonical names plus the `90` / `360` shorthands.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ninety_day" | "90" | "90lock" | "lock_90" => Ok(LockCategory::NinetyDay),
            "three_sixty_day" | "360" | "360lock" | "lock_360" => Ok(LockCategory::ThreeSixtyDay),
            other => Err(format!("unknown lock category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Active,
    /// Terminal. Paired with the ThreeSixtyDay lock created by the upgrade.
    Upgraded,
    /// Terminal. Funds returned to `available`.
    Unlocked,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Active => "active",
            LockStatus::Upgraded => "upgraded",
            LockStatus::Unlocked => "unlocked",
        }
    }
}

impl FromStr for LockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LockStatus::Active),
            "upgraded" => Ok(LockStatus::Upgraded),
            "unlocked" => Ok(LockStatus::Unlocked),
            other => Err(format!("unknown lock status: {}", other)),
        }
    }
}

/// One locking event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub id: String,
    pub owner: UserId,
    pub amount: Decimal,
    pub category: LockCategory,
    pub commitment_days: u32,
    pub created_at: TimeMs,
    pub unlock_at: TimeMs,
    pub can_upgrade: bool,
    pub upgraded_from_lock_id: Option<String>,
    pub status: LockStatus,
}

impl Lock {
    /// A fresh Active lock starting at `now`.
    ///
    /// Only NinetyDay locks are upgradeable.
    pub fn new_active(owner: UserId, amount: Decimal, category: LockCategory, now: TimeMs) -> Self {
        let commitment_days = category.commitment_days();
        Lock {
            id: uuid::Uuid::new_v4().to_string(),
            owner,
            amount,
            category,
            commitment_days,
            created_at: now,
            unlock_at: now.plus_days(commitment_days),
            can_upgrade: category == LockCategory::NinetyDay,
            upgraded_from_lock_id: None,
            status: LockStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LockStatus::Active
    }
}
