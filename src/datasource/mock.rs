//! Mock data source for testing without network calls.

use super::{DataSource, DataSourceError, PartnerProfile};
use crate::domain::{Email, ExternalSnapshot, WalletAddress};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock data source that returns predefined partner profiles.
///
/// Profiles can be replaced between calls so a test can move the external
/// balance forward and sync again.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    profiles: Arc<Mutex<HashMap<WalletAddress, PartnerProfile>>>,
    failure: Arc<Mutex<Option<DataSourceError>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockDataSource {
    /// Create a new mock data source with no profiles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile to the mock data source.
    pub fn with_profile(self, wallet: WalletAddress, email: Email, snapshot: ExternalSnapshot) -> Self {
        self.set_profile(wallet, email, snapshot);
        self
    }

    /// Sleep before answering; used to exercise caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Insert or replace the profile for `wallet`.
    pub fn set_profile(&self, wallet: WalletAddress, email: Email, snapshot: ExternalSnapshot) {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(
                wallet.clone(),
                PartnerProfile {
                    wallet,
                    email,
                    snapshot,
                },
            );
        }
    }

    /// Make every subsequent call fail with `error` (or succeed again with `None`).
    pub fn set_failure(&self, error: Option<DataSourceError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    /// Number of `fetch_profile` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn fetch_profile(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<PartnerProfile>, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failure
            .lock()
            .map_err(|e| DataSourceError::NetworkError(e.to_string()))?
            .clone();
        if let Some(err) = failure {
            return Err(err);
        }

        let profiles = self
            .profiles
            .lock()
            .map_err(|e| DataSourceError::NetworkError(e.to_string()))?;
        Ok(profiles.get(wallet).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;
    use std::str::FromStr;

    fn wallet() -> WalletAddress {
        WalletAddress::from_str("0x1111111111111111111111111111111111111111").unwrap()
    }

    #[tokio::test]
    async fn test_mock_returns_latest_profile() {
        let mock = MockDataSource::new().with_profile(
            wallet(),
            Email::from_str("a@b.io").unwrap(),
            ExternalSnapshot::default(),
        );
        let first = mock.fetch_profile(&wallet()).await.unwrap().unwrap();
        assert!(first.snapshot.total.is_zero());

        mock.set_profile(
            wallet(),
            Email::from_str("a@b.io").unwrap(),
            ExternalSnapshot {
                total: Decimal::from(10u32),
                available: Decimal::from(10u32),
                locked_three_sixty: Decimal::zero(),
            },
        );
        let second = mock.fetch_profile(&wallet()).await.unwrap().unwrap();
        assert_eq!(second.snapshot.total, Decimal::from(10u32));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure_and_unknown_wallet() {
        let mock = MockDataSource::new();
        assert!(mock.fetch_profile(&wallet()).await.unwrap().is_none());

        mock.set_failure(Some(DataSourceError::RateLimited));
        assert!(mock.fetch_profile(&wallet()).await.is_err());
    }
}
