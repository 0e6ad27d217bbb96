//! Lock commitment, upgrade and release.
//!
//! Transitions are claimed with a compare-and-set UPDATE as the first
//! statement, so at most one of two racing requests can move a given lock.

use super::{
    add_balance, ensure_portfolio, fetch_existing_portfolio, fetch_portfolio, insert_lock,
    insert_transaction, lock_from_row, store_balances, Repository, LOCK_COLUMNS,
};
use crate::domain::{
    Breakdown, Decimal, EarningSource, LedgerTransaction, Lock, LockCategory, LockStatus,
    Portfolio, TimeMs, TransactionKind, UserId,
};
use crate::engine::{check_release, plan_upgrade, validate_commitment, LockMinimums};
use crate::error::LedgerError;
use sqlx::sqlite::SqliteConnection;

/// Result of a successful upgrade.
#[derive(Debug, Clone)]
pub struct UpgradeApplied {
    /// The source lock, now `Upgraded`.
    pub previous: Lock,
    pub replacement: Lock,
    pub transaction: LedgerTransaction,
}

impl Repository {
    /// Move `amount` from available into a new Active lock.
    ///
    /// # Errors
    /// `Validation` for non-positive amounts, amounts below the category
    /// minimum, amounts above the available balance, or a bucket that would
    /// overflow.
    pub async fn commit_lock(
        &self,
        user: &UserId,
        amount: Decimal,
        category: LockCategory,
        minimums: &LockMinimums,
        now: TimeMs,
    ) -> Result<(Lock, LedgerTransaction), LedgerError> {
        let mut tx = self.pool.begin().await?;
        ensure_portfolio(&mut tx, user, now).await?;

        let mut portfolio = fetch_existing_portfolio(&mut tx, user).await?;
        validate_commitment(amount, category, portfolio.available, minimums)?;

        portfolio.available = portfolio.available - amount;
        match category {
            LockCategory::NinetyDay => {
                portfolio.locked_ninety = add_balance(portfolio.locked_ninety, amount)?
            }
            LockCategory::ThreeSixtyDay => {
                portfolio.locked_three_sixty = add_balance(portfolio.locked_three_sixty, amount)?
            }
        }
        store_balances(&mut tx, &portfolio, now).await?;

        let lock = Lock::new_active(user.clone(), amount, category, now);
        insert_lock(&mut tx, &lock).await?;

        let mut breakdown = Breakdown::default();
        match category {
            LockCategory::NinetyDay => breakdown.lock_ninety = amount,
            LockCategory::ThreeSixtyDay => breakdown.lock_three_sixty = amount,
        }
        let transaction = LedgerTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            owner: user.clone(),
            kind: TransactionKind::Locked,
            amount,
            gross_amount: amount,
            breakdown,
            description: format!("Committed {} to {} lock", amount, category),
            external_event_id: None,
            source: EarningSource::LockCommitment,
            policy_version: None,
            created_at: now,
        };
        insert_transaction(&mut tx, &transaction).await?;

        tx.commit().await?;
        tracing::info!(user = %user, lock_id = %lock.id, %amount, %category, "lock committed");
        Ok((lock, transaction))
    }

    /// Upgrade an Active NinetyDay lock into a fresh ThreeSixtyDay lock.
    ///
    /// # Errors
    /// `NotFound` for unknown ids; `InvalidState` when the lock is not an
    /// Active upgradeable NinetyDay lock (including a lost race).
    pub async fn upgrade_lock(
        &self,
        lock_id: &str,
        now: TimeMs,
    ) -> Result<UpgradeApplied, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE locks
            SET status = 'upgraded', can_upgrade = 0
            WHERE id = ? AND status = 'active' AND category = 'ninety_day' AND can_upgrade = 1
            "#,
        )
        .bind(lock_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            let current = fetch_lock(&mut tx, lock_id).await?;
            drop(tx);
            return Err(match current {
                None => LedgerError::NotFound(format!("lock {}", lock_id)),
                Some(lock) => plan_upgrade(&lock, now).err().unwrap_or_else(|| {
                    LedgerError::InvalidState(format!("lock {} changed concurrently", lock_id))
                }),
            });
        }

        let mut previous = fetch_lock(&mut tx, lock_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("lock {}", lock_id)))?;
        // Re-plan against the pre-image the UPDATE just replaced.
        let pre_image = Lock {
            status: LockStatus::Active,
            can_upgrade: true,
            ..previous.clone()
        };
        let replacement = plan_upgrade(&pre_image, now)?;

        ensure_portfolio(&mut tx, &previous.owner, now).await?;
        let mut portfolio = fetch_existing_portfolio(&mut tx, &previous.owner).await?;
        portfolio.locked_ninety = portfolio.locked_ninety - previous.amount;
        portfolio.locked_three_sixty = add_balance(portfolio.locked_three_sixty, previous.amount)?;
        store_balances(&mut tx, &portfolio, now).await?;

        insert_lock(&mut tx, &replacement).await?;

        let transaction = LedgerTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            owner: previous.owner.clone(),
            kind: TransactionKind::Upgraded,
            amount: previous.amount,
            gross_amount: previous.amount,
            breakdown: Breakdown {
                lock_three_sixty: previous.amount,
                ..Breakdown::default()
            },
            description: format!("Upgraded lock {} to 360-day commitment", previous.id),
            external_event_id: None,
            source: EarningSource::LockCommitment,
            policy_version: None,
            created_at: now,
        };
        insert_transaction(&mut tx, &transaction).await?;

        tx.commit().await?;

        previous.status = LockStatus::Upgraded;
        previous.can_upgrade = false;
        tracing::info!(
            user = %previous.owner,
            from = %previous.id,
            to = %replacement.id,
            amount = %previous.amount,
            "lock upgraded"
        );

        Ok(UpgradeApplied {
            previous,
            replacement,
            transaction,
        })
    }

    /// Release an Active lock whose unlock time has passed.
    ///
    /// # Errors
    /// `NotFound`, `InvalidState` for non-Active locks, `NotYetUnlockable`
    /// before `unlock_at`.
    pub async fn release_lock(&self, lock_id: &str, now: TimeMs) -> Result<Lock, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE locks
            SET status = 'unlocked', can_upgrade = 0
            WHERE id = ? AND status = 'active' AND unlock_at <= ?
            "#,
        )
        .bind(lock_id)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            let current = fetch_lock(&mut tx, lock_id).await?;
            drop(tx);
            return Err(match current {
                None => LedgerError::NotFound(format!("lock {}", lock_id)),
                Some(lock) => check_release(&lock, now).err().unwrap_or_else(|| {
                    LedgerError::InvalidState(format!("lock {} changed concurrently", lock_id))
                }),
            });
        }

        let lock = fetch_lock(&mut tx, lock_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("lock {}", lock_id)))?;

        ensure_portfolio(&mut tx, &lock.owner, now).await?;
        let mut portfolio = fetch_existing_portfolio(&mut tx, &lock.owner).await?;
        match lock.category {
            LockCategory::NinetyDay => {
                portfolio.locked_ninety = portfolio.locked_ninety - lock.amount
            }
            LockCategory::ThreeSixtyDay => {
                portfolio.locked_three_sixty = portfolio.locked_three_sixty - lock.amount
            }
        }
        portfolio.available = add_balance(portfolio.available, lock.amount)?;
        store_balances(&mut tx, &portfolio, now).await?;

        tx.commit().await?;
        tracing::info!(user = %lock.owner, lock_id = %lock.id, amount = %lock.amount, "lock released");
        Ok(lock)
    }

    pub async fn get_lock(&self, lock_id: &str) -> Result<Option<Lock>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_lock(&mut conn, lock_id).await
    }

    /// Locks owned by `user`, oldest first.
    pub async fn list_locks(&self, user: &UserId, active_only: bool) -> Result<Vec<Lock>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_locks(&mut conn, user, active_only).await
    }

    /// Portfolio and Active locks read from one snapshot.
    pub async fn get_portfolio_with_locks(
        &self,
        user: &UserId,
    ) -> Result<(Option<Portfolio>, Vec<Lock>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let portfolio = fetch_portfolio(&mut tx, user).await?;
        let locks = fetch_locks(&mut tx, user, true).await?;
        tx.commit().await?;
        Ok((portfolio, locks))
    }

    /// Ids of Active locks with `unlock_at <= now`, earliest first.
    pub async fn due_lock_ids(&self, now: TimeMs, limit: u32) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM locks
            WHERE status = 'active' AND unlock_at <= ?
            ORDER BY unlock_at ASC
            LIMIT ?
            "#,
        )
        .bind(now.as_ms())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
    }
}

async fn fetch_locks(
    conn: &mut SqliteConnection,
    user: &UserId,
    active_only: bool,
) -> Result<Vec<Lock>, sqlx::Error> {
    let sql = if active_only {
        format!(
            "SELECT {} FROM locks WHERE owner = ? AND status = 'active' ORDER BY created_at, id",
            LOCK_COLUMNS
        )
    } else {
        format!(
            "SELECT {} FROM locks WHERE owner = ? ORDER BY created_at, id",
            LOCK_COLUMNS
        )
    };
    let rows = sqlx::query(&sql)
        .bind(user.as_str())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(lock_from_row).collect()
}

async fn fetch_lock(conn: &mut SqliteConnection, lock_id: &str) -> Result<Option<Lock>, sqlx::Error> {
    let sql = format!("SELECT {} FROM locks WHERE id = ?", LOCK_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(lock_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| lock_from_row(&r)).transpose()
}
