//! Status level reference data.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};

/// One row of the tier table. Read-only at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusLevel {
    pub tier_name: String,
    pub min_locked_three_sixty: Decimal,
    pub multiplier: Decimal,
    pub benefits: String,
}

impl StatusLevel {
    pub fn new(tier_name: &str, min_locked_three_sixty: u32, multiplier: &str, benefits: &str) -> Self {
        StatusLevel {
            tier_name: tier_name.to_string(),
            min_locked_three_sixty: Decimal::from(min_locked_three_sixty),
            multiplier: Decimal::from_str_canonical(multiplier).unwrap_or_else(|_| Decimal::one()),
            benefits: benefits.to_string(),
        }
    }
}
