//! Domain primitives: TimeMs, UserId, WalletAddress, Email.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Milliseconds in one day.
pub const DAY_MS: i64 = 86_400_000;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Shift forward by a whole number of days.
    pub fn plus_days(&self, days: u32) -> Self {
        TimeMs(self.0.saturating_add(i64::from(days).saturating_mul(DAY_MS)))
    }

    /// RFC 3339 rendering for API responses.
    pub fn to_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }
}

/// Local account identifier, as asserted by the upstream auth gateway.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Create a UserId from a string.
    pub fn new(id: String) -> Self {
        UserId(id)
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveParseError {
    #[error("user id must be 1..=128 characters without whitespace")]
    InvalidUserId,
    #[error("wallet address must be 0x followed by 40 hex characters")]
    InvalidWallet,
    #[error("email address is malformed")]
    InvalidEmail,
}

impl FromStr for UserId {
    type Err = PrimitiveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.len() > 128 || trimmed.chars().any(char::is_whitespace)
        {
            return Err(PrimitiveParseError::InvalidUserId);
        }
        Ok(UserId(trimmed.to_string()))
    }
}

/// EVM wallet address, normalised to lower case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WalletAddress {
    type Err = PrimitiveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(PrimitiveParseError::InvalidWallet)?;
        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PrimitiveParseError::InvalidWallet);
        }
        Ok(WalletAddress(format!("0x{}", hex_part.to_ascii_lowercase())))
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = PrimitiveParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Email address compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Email(String);

impl Email {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Obscured form safe for logs: `a***@example.com`.
    pub fn redacted(&self) -> String {
        match self.0.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().unwrap_or('*');
                format!("{}***@{}", first, domain)
            }
            None => "***".to_string(),
        }
    }
}

impl FromStr for Email {
    type Err = PrimitiveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && domain.contains('.') && normalized.len() <= 254 =>
            {
                Ok(Email(normalized))
            }
            _ => Err(PrimitiveParseError::InvalidEmail),
        }
    }
}

impl TryFrom<String> for Email {
    type Error = PrimitiveParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timems_plus_days() {
        let t = TimeMs::new(1_000);
        assert_eq!(t.plus_days(90).as_ms(), 1_000 + 90 * DAY_MS);
        assert!(t < t.plus_days(1));
    }

    #[test]
    fn test_wallet_normalised_to_lowercase() {
        let wallet =
            WalletAddress::from_str("0xABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(wallet.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_wallet_rejects_bad_input() {
        assert!(WalletAddress::from_str("abc").is_err());
        assert!(WalletAddress::from_str("0x1234").is_err());
        assert!(WalletAddress::from_str("0xZZCDEF0123456789abcdef0123456789ABCDEF01").is_err());
    }

    #[test]
    fn test_email_case_insensitive() {
        let a = Email::from_str(" Alice@Example.com ").unwrap();
        let b = Email::from_str("alice@example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.redacted(), "a***@example.com");
    }

    #[test]
    fn test_user_id_rejects_whitespace() {
        assert!(UserId::from_str("user one").is_err());
        assert!(UserId::from_str("").is_err());
        assert_eq!(UserId::from_str(" u-1 ").unwrap().as_str(), "u-1");
    }
}
