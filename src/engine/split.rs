//! Split policy: allocate a credit across available / 90-day / 360-day buckets.
//!
//! The policy is a pure function of `(amount, source)`. The lock buckets are
//! truncated to [`SPLIT_DECIMALS`] places and the rounding remainder goes to
//! `available`, so the three outputs always sum exactly to the input.

use crate::domain::{Breakdown, Decimal, EarningSource};
use std::collections::HashMap;

/// Precision of the lock buckets.
pub const SPLIT_DECIMALS: u32 = 2;

/// Integer allocation weights `available : lock90 : lock360`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitWeights {
    pub available: u32,
    pub lock_ninety: u32,
    pub lock_three_sixty: u32,
}

impl SplitWeights {
    pub const fn new(available: u32, lock_ninety: u32, lock_three_sixty: u32) -> Self {
        SplitWeights {
            available,
            lock_ninety,
            lock_three_sixty,
        }
    }

    fn total(&self) -> u32 {
        self.available + self.lock_ninety + self.lock_three_sixty
    }
}

/// Versioned table of weights keyed by earning source.
#[derive(Debug, Clone)]
pub struct SplitPolicyTable {
    version: u32,
    weights: HashMap<EarningSource, SplitWeights>,
}

impl SplitPolicyTable {
    /// Version 2: one table for every call site.
    ///
    /// Shopping rewards keep 1/60 spendable and lock the rest 49:10 across the
    /// 90- and 360-day buckets (1500 -> 25 / 1225 / 250).
    pub fn current() -> Self {
        let weights = HashMap::from([
            (EarningSource::AffiliatePurchase, SplitWeights::new(1, 49, 10)),
            (EarningSource::Referral, SplitWeights::new(1, 0, 0)),
            (EarningSource::DailyCheckin, SplitWeights::new(1, 0, 0)),
            (EarningSource::Manual, SplitWeights::new(1, 0, 0)),
            (EarningSource::TokenPurchase, SplitWeights::new(0, 0, 1)),
        ]);
        SplitPolicyTable { version: 2, weights }
    }

    /// Build a custom table. Sources with all-zero weights are dropped.
    pub fn with_weights(version: u32, entries: &[(EarningSource, SplitWeights)]) -> Self {
        let weights = entries
            .iter()
            .filter(|(_, w)| w.total() > 0)
            .map(|(s, w)| (*s, *w))
            .collect();
        SplitPolicyTable { version, weights }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Weights for `source`, if the source is split at all.
    pub fn weights(&self, source: EarningSource) -> Option<SplitWeights> {
        self.weights.get(&source).copied()
    }

    /// Split `amount` for `source`.
    ///
    /// Sources without an entry (e.g. reconciliation credits, which allocate
    /// their own buckets) go entirely to `available`. Non-positive amounts
    /// produce an all-zero breakdown.
    pub fn split(&self, amount: Decimal, source: EarningSource) -> Breakdown {
        if !amount.is_positive() {
            return Breakdown::default();
        }
        let weights = self
            .weights(source)
            .unwrap_or(SplitWeights::new(1, 0, 0));
        split_with(amount, weights)
    }
}

/// Apply `weights` to `amount`; remainder to `available`.
pub fn split_with(amount: Decimal, weights: SplitWeights) -> Breakdown {
    let total = Decimal::from(weights.total());
    let share = |w: u32| -> Decimal {
        if w == 0 {
            Decimal::zero()
        } else {
            (amount * Decimal::from(w) / total).round_down(SPLIT_DECIMALS)
        }
    };

    let lock_ninety = share(weights.lock_ninety);
    let lock_three_sixty = share(weights.lock_three_sixty);
    Breakdown {
        available: amount - lock_ninety - lock_three_sixty,
        lock_ninety,
        lock_three_sixty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_shopping_split_of_1500() {
        let table = SplitPolicyTable::current();
        let b = table.split(d("1500"), EarningSource::AffiliatePurchase);
        assert_eq!(b.available, d("25"));
        assert_eq!(b.lock_ninety, d("1225"));
        assert_eq!(b.lock_three_sixty, d("250"));
    }

    #[test]
    fn test_shopping_split_of_50_assigns_remainder_to_available() {
        let table = SplitPolicyTable::current();
        let b = table.split(d("50"), EarningSource::AffiliatePurchase);
        assert_eq!(b.lock_ninety, d("40.83"));
        assert_eq!(b.lock_three_sixty, d("8.33"));
        assert_eq!(b.available, d("0.84"));
        assert_eq!(b.total(), d("50"));
    }

    #[test]
    fn test_referral_is_fully_available() {
        let table = SplitPolicyTable::current();
        let b = table.split(d("12.5"), EarningSource::Referral);
        assert_eq!(b.available, d("12.5"));
        assert!(b.lock_ninety.is_zero());
        assert!(b.lock_three_sixty.is_zero());
    }

    #[test]
    fn test_token_purchase_fully_locked_for_360() {
        let table = SplitPolicyTable::current();
        let b = table.split(d("1500"), EarningSource::TokenPurchase);
        assert!(b.available.is_zero());
        assert_eq!(b.lock_three_sixty, d("1500"));
    }

    #[test]
    fn test_unlisted_source_goes_to_available() {
        let table = SplitPolicyTable::current();
        let b = table.split(d("7"), EarningSource::NctrLiveSync);
        assert_eq!(b.available, d("7"));
    }

    #[test]
    fn test_zero_amount_is_empty() {
        let table = SplitPolicyTable::current();
        assert_eq!(
            table.split(Decimal::zero(), EarningSource::AffiliatePurchase),
            Breakdown::default()
        );
    }

    #[test]
    fn test_custom_table_drops_zero_weights() {
        let table = SplitPolicyTable::with_weights(
            9,
            &[
                (EarningSource::Referral, SplitWeights::new(0, 0, 0)),
                (EarningSource::Manual, SplitWeights::new(0, 1, 0)),
            ],
        );
        assert_eq!(table.version(), 9);
        assert!(table.weights(EarningSource::Referral).is_none());
        let b = table.split(d("3"), EarningSource::Manual);
        assert_eq!(b.lock_ninety, d("3"));
    }

    fn amount_strategy() -> impl Strategy<Value = Decimal> {
        // 0.01 ..= 10_000_000.00 with up to 6 decimal places.
        (1u64..10_000_000_000_000u64, 0u32..=6).prop_map(|(units, scale)| {
            Decimal::new(rust_decimal::Decimal::from_i128_with_scale(
                i128::from(units),
                scale,
            ))
        })
    }

    fn weights_strategy() -> impl Strategy<Value = SplitWeights> {
        (0u32..100, 0u32..100, 0u32..100)
            .prop_filter("weights must not all be zero", |(a, b, c)| a + b + c > 0)
            .prop_map(|(a, b, c)| SplitWeights::new(a, b, c))
    }

    proptest! {
        /// Property: the three buckets always sum exactly to the input.
        #[test]
        fn prop_split_conserves_value(amount in amount_strategy(), weights in weights_strategy()) {
            let b = split_with(amount, weights);
            prop_assert_eq!(b.total(), amount);
        }

        /// Property: no bucket is ever negative.
        #[test]
        fn prop_split_buckets_non_negative(amount in amount_strategy(), weights in weights_strategy()) {
            let b = split_with(amount, weights);
            prop_assert!(!b.available.is_negative());
            prop_assert!(!b.lock_ninety.is_negative());
            prop_assert!(!b.lock_three_sixty.is_negative());
        }

        /// Property: conservation holds for every source of the current table.
        #[test]
        fn prop_current_table_conserves(amount in amount_strategy(), idx in 0usize..6) {
            let sources = [
                EarningSource::AffiliatePurchase,
                EarningSource::Referral,
                EarningSource::DailyCheckin,
                EarningSource::Manual,
                EarningSource::TokenPurchase,
                EarningSource::NctrLiveSync,
            ];
            let b = SplitPolicyTable::current().split(amount, sources[idx]);
            prop_assert_eq!(b.total(), amount);
        }
    }
}
