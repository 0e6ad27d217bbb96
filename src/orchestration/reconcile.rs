//! Reconciliation engine: merge the partner snapshot into the local ledger.
//!
//! Credit-only. Growth of the external balance since the cached snapshot is
//! credited once; decreases only move the cached snapshot.

use super::rate_limit::CooldownLimiter;
use crate::datasource::DataSource;
use crate::db::Repository;
use crate::domain::{Decimal, Email, ExternalSnapshot, Portfolio, TimeMs, UserId, WalletAddress};
use crate::error::LedgerError;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Credits applied by one sync; all zero when nothing was new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCredits {
    pub available: Decimal,
    #[serde(rename = "locked360")]
    pub locked_three_sixty: Decimal,
    pub total: Decimal,
}

/// Read-only view for `check_sync_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub user_id: UserId,
    pub linked_wallet: Option<WalletAddress>,
    pub external_verified: bool,
    pub last_sync_at: Option<TimeMs>,
    pub last_sync_error: Option<String>,
    pub external_snapshot: ExternalSnapshot,
}

impl From<Portfolio> for SyncStatus {
    fn from(p: Portfolio) -> Self {
        SyncStatus {
            user_id: p.user_id,
            linked_wallet: p.linked_wallet,
            external_verified: p.external_verified,
            last_sync_at: p.last_sync_at,
            last_sync_error: p.last_sync_error,
            external_snapshot: p.external_snapshot,
        }
    }
}

#[derive(Debug)]
pub struct Reconciler {
    repo: Arc<Repository>,
    datasource: Arc<dyn DataSource>,
    limiter: CooldownLimiter,
    fetch_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        repo: Arc<Repository>,
        datasource: Arc<dyn DataSource>,
        cooldown: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            datasource,
            limiter: CooldownLimiter::new(cooldown),
            fetch_timeout,
        }
    }

    /// Fetch the partner profile for `wallet` and merge it into `user`'s ledger.
    ///
    /// # Errors
    /// - `RateLimited` inside the per-user cool-down (nothing recorded)
    /// - `ExternalFetchFailure` on timeout or partner errors
    /// - `UnresolvableIdentity` when the partner has no account for the wallet
    /// - `IdentityMismatch` when the partner email differs from `email`
    /// - `DuplicateWalletClaim` when another user already linked the wallet
    /// - `Conflict` when `user` is already linked to a different wallet
    ///
    /// Every failure after the cool-down check is recorded as `lastSyncError`.
    pub async fn sync_profile(
        &self,
        user: &UserId,
        wallet: &WalletAddress,
        email: &Email,
    ) -> Result<SyncCredits, LedgerError> {
        self.limiter.try_acquire(user, Instant::now())?;

        match self.merge(user, wallet, email).await {
            Ok(credits) => Ok(credits),
            Err(err) => {
                warn!(user = %user, %wallet, error = %err, "sync failed");
                if let Err(record_err) = self
                    .repo
                    .record_sync_error(user, &err.to_string(), TimeMs::now())
                    .await
                {
                    warn!(user = %user, error = %record_err, "failed to record sync error");
                }
                Err(err)
            }
        }
    }

    /// Cached sync metadata; never mutates. Unknown users get an empty view.
    pub async fn sync_status(&self, user: &UserId) -> Result<SyncStatus, LedgerError> {
        let portfolio = self
            .repo
            .get_portfolio(user)
            .await?
            .unwrap_or_else(|| Portfolio::empty(user.clone()));
        Ok(portfolio.into())
    }

    async fn merge(
        &self,
        user: &UserId,
        wallet: &WalletAddress,
        email: &Email,
    ) -> Result<SyncCredits, LedgerError> {
        let profile = match tokio::time::timeout(self.fetch_timeout, self.datasource.fetch_profile(wallet)).await {
            Err(_) => {
                return Err(LedgerError::ExternalFetchFailure(format!(
                    "partner fetch timed out after {}ms",
                    self.fetch_timeout.as_millis()
                )))
            }
            Ok(Err(e)) => return Err(LedgerError::ExternalFetchFailure(e.to_string())),
            Ok(Ok(None)) => {
                return Err(LedgerError::UnresolvableIdentity(format!(
                    "no partner account for wallet {}",
                    wallet
                )))
            }
            Ok(Ok(Some(profile))) => profile,
        };

        if &profile.email != email {
            warn!(
                user = %user,
                expected = %email.redacted(),
                found = %profile.email.redacted(),
                "partner email mismatch"
            );
            return Err(LedgerError::IdentityMismatch);
        }

        if let Some(owner) = self.repo.find_wallet_owner(wallet).await? {
            if &owner != user {
                return Err(LedgerError::DuplicateWalletClaim {
                    wallet: wallet.to_string(),
                });
            }
        }

        let applied = self
            .repo
            .apply_sync(user, wallet, profile.snapshot, TimeMs::now())
            .await?;

        if applied.delta.is_empty() {
            info!(user = %user, %wallet, "sync found nothing new");
        }

        Ok(SyncCredits {
            available: applied.delta.credit_available,
            locked_three_sixty: applied.delta.credit_lock_three_sixty,
            total: applied.delta.total(),
        })
    }
}
