//! Lock state machine rules.
//!
//! `Active -> Upgraded` (NinetyDay only) and `Active -> Unlocked` are the only
//! transitions. These checks are pure; the repository re-asserts them inside
//! the atomic write so a concurrent transition cannot slip between check and
//! commit.

use crate::domain::{Decimal, Lock, LockCategory, LockStatus, TimeMs};
use crate::error::LedgerError;

/// Minimum commitment per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockMinimums {
    pub ninety_day: Decimal,
    pub three_sixty_day: Decimal,
}

impl LockMinimums {
    pub fn for_category(&self, category: LockCategory) -> Decimal {
        match category {
            LockCategory::NinetyDay => self.ninety_day,
            LockCategory::ThreeSixtyDay => self.three_sixty_day,
        }
    }
}

/// Build the ThreeSixtyDay lock that replaces `source` on upgrade.
pub fn plan_upgrade(source: &Lock, now: TimeMs) -> Result<Lock, LedgerError> {
    if source.status != LockStatus::Active {
        return Err(LedgerError::InvalidState(format!(
            "lock {} is {}, only active locks can be upgraded",
            source.id,
            source.status.as_str()
        )));
    }
    if source.category != LockCategory::NinetyDay || !source.can_upgrade {
        return Err(LedgerError::InvalidState(format!(
            "lock {} ({}) is not upgradeable",
            source.id, source.category
        )));
    }

    let mut replacement = Lock::new_active(
        source.owner.clone(),
        source.amount,
        LockCategory::ThreeSixtyDay,
        now,
    );
    replacement.upgraded_from_lock_id = Some(source.id.clone());
    Ok(replacement)
}

/// Check that `lock` may be released at `now`.
pub fn check_release(lock: &Lock, now: TimeMs) -> Result<(), LedgerError> {
    if lock.status != LockStatus::Active {
        return Err(LedgerError::InvalidState(format!(
            "lock {} is {}, only active locks can be released",
            lock.id,
            lock.status.as_str()
        )));
    }
    if now < lock.unlock_at {
        return Err(LedgerError::NotYetUnlockable {
            unlock_at: lock.unlock_at,
        });
    }
    Ok(())
}

/// Validate a user commitment of `amount` from `available` into `category`.
pub fn validate_commitment(
    amount: Decimal,
    category: LockCategory,
    available: Decimal,
    minimums: &LockMinimums,
) -> Result<(), LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }
    let minimum = minimums.for_category(category);
    if amount < minimum {
        return Err(LedgerError::Validation(format!(
            "minimum commitment for {} is {}",
            category, minimum
        )));
    }
    if amount > available {
        return Err(LedgerError::Validation(format!(
            "insufficient available balance: requested {}, available {}",
            amount, available
        )));
    }
    Ok(())
}
