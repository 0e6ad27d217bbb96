//! Reconciliation merges and sync metadata.

use super::{
    credit_portfolio, ensure_portfolio, fetch_existing_portfolio, insert_lock, insert_transaction,
    store_balances, Repository,
};
use crate::domain::{
    Breakdown, EarningSource, ExternalSnapshot, LedgerTransaction, Lock, LockCategory, Portfolio,
    TimeMs, TransactionKind, UserId, WalletAddress,
};
use crate::engine::{compute_sync_delta, SyncDelta};
use crate::error::LedgerError;

/// Outcome of merging one external snapshot.
#[derive(Debug, Clone)]
pub struct SyncApplied {
    pub delta: SyncDelta,
    /// Present only when the delta was non-empty.
    pub transaction: Option<LedgerTransaction>,
    /// Present only when the 360-day delta was positive.
    pub lock: Option<Lock>,
    pub portfolio: Portfolio,
}

impl Repository {
    /// Current owner of a linked wallet, if any.
    pub async fn find_wallet_owner(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<UserId>, sqlx::Error> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM portfolios WHERE linked_wallet = ?")
                .bind(wallet.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(owner.map(UserId::new))
    }

    /// Link `wallet`, credit the positive delta against the cached snapshot,
    /// and store `fresh` as the new snapshot, all in one atomic unit.
    ///
    /// The delta is computed from the snapshot read inside the transaction,
    /// so two overlapping syncs cannot both credit the same growth. The
    /// snapshot belongs to the linked wallet, so a user stays on the first
    /// wallet they link.
    ///
    /// # Errors
    /// `DuplicateWalletClaim` when another portfolio already holds `wallet`;
    /// `Conflict` when this user is linked to a different wallet.
    pub async fn apply_sync(
        &self,
        user: &UserId,
        wallet: &WalletAddress,
        fresh: ExternalSnapshot,
        now: TimeMs,
    ) -> Result<SyncApplied, LedgerError> {
        let mut tx = self.pool.begin().await?;
        ensure_portfolio(&mut tx, user, now).await?;

        let mut portfolio = fetch_existing_portfolio(&mut tx, user).await?;
        match &portfolio.linked_wallet {
            Some(linked) if linked != wallet => {
                return Err(LedgerError::Conflict(format!(
                    "user {} is already linked to wallet {}",
                    user, linked
                )));
            }
            Some(_) => {}
            None => {
                let linked = sqlx::query("UPDATE portfolios SET linked_wallet = ? WHERE user_id = ?")
                    .bind(wallet.as_str())
                    .bind(user.as_str())
                    .execute(&mut *tx)
                    .await;
                if let Err(err) = linked {
                    if is_unique_violation(&err) {
                        return Err(LedgerError::DuplicateWalletClaim {
                            wallet: wallet.to_string(),
                        });
                    }
                    return Err(err.into());
                }
            }
        }

        let delta = compute_sync_delta(&portfolio.external_snapshot, &fresh);

        let mut transaction = None;
        let mut lock = None;
        if !delta.is_empty() {
            let breakdown = Breakdown {
                available: delta.credit_available,
                lock_three_sixty: delta.credit_lock_three_sixty,
                ..Breakdown::default()
            };
            let amount = delta.total();
            credit_portfolio(&mut portfolio, &breakdown, amount)?;
            store_balances(&mut tx, &portfolio, now).await?;

            if delta.credit_lock_three_sixty.is_positive() {
                let created = Lock::new_active(
                    user.clone(),
                    delta.credit_lock_three_sixty,
                    LockCategory::ThreeSixtyDay,
                    now,
                );
                insert_lock(&mut tx, &created).await?;
                lock = Some(created);
            }

            let txn = LedgerTransaction {
                id: uuid::Uuid::new_v4().to_string(),
                owner: user.clone(),
                kind: TransactionKind::Earned,
                amount,
                gross_amount: amount,
                breakdown,
                description: "Synced from partner account".to_string(),
                external_event_id: None,
                source: EarningSource::NctrLiveSync,
                policy_version: None,
                created_at: now,
            };
            insert_transaction(&mut tx, &txn).await?;
            transaction = Some(txn);
        }

        sqlx::query(
            r#"
            UPDATE portfolios
            SET ext_available = ?, ext_locked_three_sixty = ?, ext_total = ?,
                external_verified = 1, last_sync_at = ?, last_sync_error = NULL, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(fresh.available.to_canonical_string())
        .bind(fresh.locked_three_sixty.to_canonical_string())
        .bind(fresh.total.to_canonical_string())
        .bind(now.as_ms())
        .bind(now.as_ms())
        .bind(user.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        portfolio.linked_wallet = Some(wallet.clone());
        portfolio.external_snapshot = fresh;
        portfolio.external_verified = true;
        portfolio.last_sync_at = Some(now);
        portfolio.last_sync_error = None;

        tracing::info!(
            user = %user,
            wallet = %wallet,
            credited = %delta.total(),
            "sync applied"
        );

        Ok(SyncApplied {
            delta,
            transaction,
            lock,
            portfolio,
        })
    }

    /// Record a failed sync attempt. Creates the portfolio row if needed.
    pub async fn record_sync_error(
        &self,
        user: &UserId,
        message: &str,
        now: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO portfolios (user_id, last_sync_at, last_sync_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                last_sync_at = excluded.last_sync_at,
                last_sync_error = excluded.last_sync_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user.as_str())
        .bind(now.as_ms())
        .bind(message)
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
