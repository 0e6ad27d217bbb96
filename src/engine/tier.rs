//! Tier calculator: derive status from the 360-day locked balance.
//!
//! Always recomputed on read; never stored on the portfolio.

use crate::domain::{Decimal, StatusLevel};
use serde::Serialize;

/// Where a balance sits in the tier table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStanding {
    /// Highest tier whose threshold is <= balance (inclusive).
    pub current: Option<StatusLevel>,
    /// Earnings multiplier of `current`, or 1 with no tier.
    pub multiplier: Decimal,
    pub next: Option<NextTier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextTier {
    pub level: StatusLevel,
    pub remaining: Decimal,
}

impl TierStanding {
    /// Ordinal position in the table; 0 means no tier.
    pub fn rank(&self, levels: &[StatusLevel]) -> usize {
        self.current.as_ref().map_or(0, |c| {
            levels
                .iter()
                .filter(|l| l.min_locked_three_sixty <= c.min_locked_three_sixty)
                .count()
        })
    }
}

/// Compute the standing of `locked_three_sixty` against `levels`.
///
/// `levels` need not be pre-sorted; it is ordered ascending by threshold here.
pub fn tier_for(locked_three_sixty: Decimal, levels: &[StatusLevel]) -> TierStanding {
    let mut ordered: Vec<&StatusLevel> = levels.iter().collect();
    ordered.sort_by(|a, b| a.min_locked_three_sixty.cmp(&b.min_locked_three_sixty));

    let split_at = ordered.partition_point(|l| l.min_locked_three_sixty <= locked_three_sixty);
    let current = split_at.checked_sub(1).map(|i| ordered[i].clone());
    let next = ordered.get(split_at).map(|l| NextTier {
        level: (*l).clone(),
        remaining: l.min_locked_three_sixty - locked_three_sixty,
    });
    let multiplier = current
        .as_ref()
        .map_or_else(Decimal::one, |c| c.multiplier);

    TierStanding {
        current,
        multiplier,
        next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> Vec<StatusLevel> {
        vec![
            StatusLevel::new("bronze", 1000, "1.1", "base perks"),
            StatusLevel::new("silver", 2500, "1.25", "more perks"),
            StatusLevel::new("gold", 5000, "1.5", "most perks"),
        ]
    }

    #[test]
    fn test_exact_threshold_is_inclusive() {
        let standing = tier_for(Decimal::from(2500u32), &table());
        assert_eq!(standing.current.as_ref().unwrap().tier_name, "silver");
        let next = standing.next.unwrap();
        assert_eq!(next.level.tier_name, "gold");
        assert_eq!(next.remaining, Decimal::from(2500u32));
    }

    #[test]
    fn test_below_lowest_threshold_has_no_tier() {
        let standing = tier_for(Decimal::from(999u32), &table());
        assert!(standing.current.is_none());
        assert_eq!(standing.multiplier, Decimal::one());
        let next = standing.next.unwrap();
        assert_eq!(next.level.tier_name, "bronze");
        assert_eq!(next.remaining, Decimal::from(1u32));
    }

    #[test]
    fn test_top_tier_has_no_next() {
        let standing = tier_for(Decimal::from(100_000u32), &table());
        assert_eq!(standing.current.as_ref().unwrap().tier_name, "gold");
        assert!(standing.next.is_none());
        assert_eq!(standing.multiplier.to_canonical_string(), "1.5");
    }

    #[test]
    fn test_unsorted_table_is_handled() {
        let mut levels = table();
        levels.reverse();
        let standing = tier_for(Decimal::from(1200u32), &levels);
        assert_eq!(standing.current.unwrap().tier_name, "bronze");
    }

    #[test]
    fn test_empty_table() {
        let standing = tier_for(Decimal::from(10u32), &[]);
        assert!(standing.current.is_none());
        assert!(standing.next.is_none());
    }

    proptest! {
        /// Property: a larger balance never yields a lower tier.
        #[test]
        fn prop_tier_is_monotonic(a in 0u32..20_000, b in 0u32..20_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let levels = table();
            let lo_rank = tier_for(Decimal::from(lo), &levels).rank(&levels);
            let hi_rank = tier_for(Decimal::from(hi), &levels).rank(&levels);
            prop_assert!(lo_rank <= hi_rank);
        }
    }
}
