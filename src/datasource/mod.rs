//! Data source abstraction for the external system of record.
//!
//! The reconciliation engine only needs one call: fetch the partner profile
//! (email plus balance snapshot) keyed by wallet address.

use crate::domain::{Decimal, Email, ExternalSnapshot, WalletAddress};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

pub mod mock;
pub mod partner;

pub use mock::MockDataSource;
pub use partner::PartnerDataSource;

/// Partner account as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerProfile {
    pub wallet: WalletAddress,
    pub email: Email,
    pub snapshot: ExternalSnapshot,
}

/// Data source trait for fetching partner profiles.
///
/// Implementations handle retry/backoff for transient failures. The caller
/// bounds the whole call with a timeout.
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Fetch the partner profile linked to `wallet`.
    ///
    /// # Returns
    /// `None` when the partner has no account for the wallet.
    async fn fetch_profile(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<PartnerProfile>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
        }
    }
}

impl std::error::Error for DataSourceError {}

/// Wire shape of a partner profile. Balances may arrive as numbers or strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileResponse {
    pub email: String,
    #[serde(deserialize_with = "crate::domain::deserialize_amount", alias = "available_balance")]
    pub available: Decimal,
    #[serde(
        deserialize_with = "crate::domain::deserialize_amount",
        alias = "locked360",
        alias = "lock_360_balance"
    )]
    pub locked_three_sixty: Decimal,
    #[serde(deserialize_with = "crate::domain::deserialize_amount", alias = "total_balance")]
    pub total: Decimal,
}

impl ProfileResponse {
    /// Validate and convert into a `PartnerProfile` for `wallet`.
    pub(crate) fn into_profile(self, wallet: &WalletAddress) -> Result<PartnerProfile, DataSourceError> {
        let email = self
            .email
            .parse::<Email>()
            .map_err(|e| DataSourceError::ParseError(e.to_string()))?;
        let snapshot = ExternalSnapshot {
            available: self.available,
            locked_three_sixty: self.locked_three_sixty,
            total: self.total,
        };
        if [snapshot.available, snapshot.locked_three_sixty, snapshot.total]
            .iter()
            .any(|b| b.is_negative())
        {
            return Err(DataSourceError::ParseError(
                "negative balance in partner profile".to_string(),
            ));
        }
        Ok(PartnerProfile {
            wallet: wallet.clone(),
            email,
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = DataSourceError::HttpError {
            status: 429,
            message: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 429: Too many requests");

        let err = DataSourceError::RateLimited;
        assert_eq!(err.to_string(), "Rate limited");
    }

    #[test]
    fn test_profile_response_accepts_mixed_number_shapes() {
        let wallet = WalletAddress::from_str("0x00000000000000000000000000000000000000aa").unwrap();
        let raw = r#"{"email":"Alice@Example.com","available":"500","locked360":1000,"total":1500.0}"#;
        let parsed: ProfileResponse = serde_json::from_str(raw).unwrap();
        let profile = parsed.into_profile(&wallet).unwrap();

        assert_eq!(profile.email.as_str(), "alice@example.com");
        assert_eq!(profile.snapshot.locked_three_sixty, Decimal::from(1000u32));
        assert_eq!(profile.snapshot.total, Decimal::from(1500u32));
    }

    #[test]
    fn test_profile_response_rejects_negative_balance() {
        let wallet = WalletAddress::from_str("0x00000000000000000000000000000000000000aa").unwrap();
        let raw = r#"{"email":"a@b.io","available":"-1","lockedThreeSixty":"0","total":"0"}"#;
        let parsed: ProfileResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.into_profile(&wallet).is_err());
    }
}
