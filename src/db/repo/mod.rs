//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `credits.rs` - Idempotent credits and the transaction audit trail
//! - `locks.rs` - Lock commitment, upgrade and release
//! - `sync.rs` - Reconciliation merges and sync metadata
//! - `tracking.rs` - Tracking links and pending commissions
//!
//! Every multi-row mutation runs inside one sqlx transaction whose first
//! statement is a write, so SQLite holds the write lock for the whole
//! read-modify-write. Dropping an uncommitted transaction rolls it back.

mod credits;
mod locks;
mod sync;
mod tracking;

pub use credits::{CreditApplied, CreditRecord};
pub(crate) use credits::verify_replay;
pub use locks::UpgradeApplied;
pub use sync::SyncApplied;
pub use tracking::PendingCommission;

use crate::domain::{
    Breakdown, Decimal, EarningSource, ExternalSnapshot, LedgerTransaction, Lock, Portfolio,
    StatusLevel, TimeMs, UserId, WalletAddress,
};
use crate::error::LedgerError;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Portfolio reads
    // =========================================================================

    /// Get the portfolio for a user, if one has been created.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored amount is corrupt.
    pub async fn get_portfolio(&self, user: &UserId) -> Result<Option<Portfolio>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_portfolio(&mut conn, user).await
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    /// Load the status level table, ascending by threshold.
    pub async fn load_status_levels(&self) -> Result<Vec<StatusLevel>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT tier_name, min_locked_three_sixty, multiplier, benefits
            FROM status_levels
            ORDER BY sort_order ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut levels = rows
            .iter()
            .map(|row| {
                Ok(StatusLevel {
                    tier_name: row.try_get("tier_name")?,
                    min_locked_three_sixty: parsed_column(row, "min_locked_three_sixty")?,
                    multiplier: parsed_column(row, "multiplier")?,
                    benefits: row.try_get("benefits")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        levels.sort_by(|a, b| a.min_locked_three_sixty.cmp(&b.min_locked_three_sixty));
        Ok(levels)
    }
}

// =============================================================================
// Helpers shared by the submodules (run on a connection or open transaction)
// =============================================================================

/// Parse a TEXT column through `FromStr`, surfacing failures as decode errors.
pub(crate) fn parsed_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: Into<BoxDynError>,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

/// Create the portfolio row if missing. Always a write, so it also takes the
/// SQLite write lock when used as the first statement of a transaction.
pub(crate) async fn ensure_portfolio(
    conn: &mut SqliteConnection,
    user: &UserId,
    now: TimeMs,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO portfolios (user_id, created_at, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET updated_at = excluded.updated_at
        "#,
    )
    .bind(user.as_str())
    .bind(now.as_ms())
    .bind(now.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn fetch_portfolio(
    conn: &mut SqliteConnection,
    user: &UserId,
) -> Result<Option<Portfolio>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT user_id, available, locked_ninety, locked_three_sixty, total_earned,
               linked_wallet, ext_available, ext_locked_three_sixty, ext_total,
               external_verified, last_sync_at, last_sync_error
        FROM portfolios
        WHERE user_id = ?
        "#,
    )
    .bind(user.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| portfolio_from_row(&r)).transpose()
}

/// Persist the four balance columns of `portfolio`.
pub(crate) async fn store_balances(
    conn: &mut SqliteConnection,
    portfolio: &Portfolio,
    now: TimeMs,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE portfolios
        SET available = ?, locked_ninety = ?, locked_three_sixty = ?, total_earned = ?,
            updated_at = ?
        WHERE user_id = ?
        "#,
    )
    .bind(portfolio.available.to_canonical_string())
    .bind(portfolio.locked_ninety.to_canonical_string())
    .bind(portfolio.locked_three_sixty.to_canonical_string())
    .bind(portfolio.total_earned.to_canonical_string())
    .bind(now.as_ms())
    .bind(portfolio.user_id.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Load the portfolio inside a transaction that already ran `ensure_portfolio`.
pub(crate) async fn fetch_existing_portfolio(
    conn: &mut SqliteConnection,
    user: &UserId,
) -> Result<Portfolio, sqlx::Error> {
    fetch_portfolio(conn, user)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub(crate) async fn insert_lock(conn: &mut SqliteConnection, lock: &Lock) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO locks (
            id, owner, amount, category, commitment_days, created_at, unlock_at,
            can_upgrade, upgraded_from_lock_id, status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&lock.id)
    .bind(lock.owner.as_str())
    .bind(lock.amount.to_canonical_string())
    .bind(lock.category.as_str())
    .bind(i64::from(lock.commitment_days))
    .bind(lock.created_at.as_ms())
    .bind(lock.unlock_at.as_ms())
    .bind(lock.can_upgrade)
    .bind(lock.upgraded_from_lock_id.as_deref())
    .bind(lock.status.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert an audit row. Returns false when `(source, external_event_id)`
/// already exists.
///
/// The UNIQUE constraint on that pair is the idempotency guard of last
/// resort: two concurrent deliveries cannot both get past it. Keys are scoped
/// per source, so a webhook order id never collides with a purchase hash.
pub(crate) async fn insert_transaction(
    conn: &mut SqliteConnection,
    txn: &LedgerTransaction,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_transactions (
            id, owner, kind, amount, gross_amount, available_amount, lock_ninety_amount,
            lock_three_sixty_amount, description, external_event_id, source,
            policy_version, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source, external_event_id) DO NOTHING
        "#,
    )
    .bind(&txn.id)
    .bind(txn.owner.as_str())
    .bind(txn.kind.as_str())
    .bind(txn.amount.to_canonical_string())
    .bind(txn.gross_amount.to_canonical_string())
    .bind(txn.breakdown.available.to_canonical_string())
    .bind(txn.breakdown.lock_ninety.to_canonical_string())
    .bind(txn.breakdown.lock_three_sixty.to_canonical_string())
    .bind(&txn.description)
    .bind(txn.external_event_id.as_deref())
    .bind(txn.source.as_str())
    .bind(txn.policy_version.map(i64::from))
    .bind(txn.created_at.as_ms())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Look up the transaction recorded under an idempotency key.
pub(crate) async fn fetch_transaction_by_key(
    conn: &mut SqliteConnection,
    source: EarningSource,
    external_event_id: &str,
) -> Result<Option<LedgerTransaction>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM ledger_transactions WHERE source = ? AND external_event_id = ?",
        TRANSACTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(source.as_str())
        .bind(external_event_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| transaction_from_row(&r)).transpose()
}

pub(crate) fn portfolio_from_row(row: &SqliteRow) -> Result<Portfolio, sqlx::Error> {
    let linked_wallet: Option<String> = row.try_get("linked_wallet")?;
    let linked_wallet = linked_wallet
        .map(|w| {
            WalletAddress::from_str(&w).map_err(|e| sqlx::Error::ColumnDecode {
                index: "linked_wallet".to_string(),
                source: Box::new(e),
            })
        })
        .transpose()?;

    Ok(Portfolio {
        user_id: UserId::new(row.try_get("user_id")?),
        available: parsed_column(row, "available")?,
        locked_ninety: parsed_column(row, "locked_ninety")?,
        locked_three_sixty: parsed_column(row, "locked_three_sixty")?,
        total_earned: parsed_column(row, "total_earned")?,
        linked_wallet,
        external_snapshot: ExternalSnapshot {
            available: parsed_column(row, "ext_available")?,
            locked_three_sixty: parsed_column(row, "ext_locked_three_sixty")?,
            total: parsed_column(row, "ext_total")?,
        },
        external_verified: row.try_get::<i64, _>("external_verified")? != 0,
        last_sync_at: row.try_get::<Option<i64>, _>("last_sync_at")?.map(TimeMs::new),
        last_sync_error: row.try_get("last_sync_error")?,
    })
}

pub(crate) fn lock_from_row(row: &SqliteRow) -> Result<Lock, sqlx::Error> {
    Ok(Lock {
        id: row.try_get("id")?,
        owner: UserId::new(row.try_get("owner")?),
        amount: parsed_column(row, "amount")?,
        category: parsed_column(row, "category")?,
        commitment_days: u32::try_from(row.try_get::<i64, _>("commitment_days")?)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "commitment_days".to_string(),
                source: Box::new(e),
            })?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        unlock_at: TimeMs::new(row.try_get("unlock_at")?),
        can_upgrade: row.try_get("can_upgrade")?,
        upgraded_from_lock_id: row.try_get("upgraded_from_lock_id")?,
        status: parsed_column(row, "status")?,
    })
}

pub(crate) fn transaction_from_row(row: &SqliteRow) -> Result<LedgerTransaction, sqlx::Error> {
    Ok(LedgerTransaction {
        id: row.try_get("id")?,
        owner: UserId::new(row.try_get("owner")?),
        kind: parsed_column(row, "kind")?,
        amount: parsed_column(row, "amount")?,
        gross_amount: parsed_column(row, "gross_amount")?,
        breakdown: Breakdown {
            available: parsed_column(row, "available_amount")?,
            lock_ninety: parsed_column(row, "lock_ninety_amount")?,
            lock_three_sixty: parsed_column(row, "lock_three_sixty_amount")?,
        },
        description: row.try_get("description")?,
        external_event_id: row.try_get("external_event_id")?,
        source: parsed_column(row, "source")?,
        policy_version: row
            .try_get::<Option<i64>, _>("policy_version")?
            .and_then(|v| u32::try_from(v).ok()),
        created_at: TimeMs::new(row.try_get("created_at")?),
    })
}

/// Add `breakdown` to the buckets and `amount` to `total_earned`.
///
/// Leaves `portfolio` untouched when any bucket would overflow.
pub(crate) fn credit_portfolio(
    portfolio: &mut Portfolio,
    breakdown: &Breakdown,
    amount: Decimal,
) -> Result<(), LedgerError> {
    let available = add_balance(portfolio.available, breakdown.available)?;
    let locked_ninety = add_balance(portfolio.locked_ninety, breakdown.lock_ninety)?;
    let locked_three_sixty = add_balance(portfolio.locked_three_sixty, breakdown.lock_three_sixty)?;
    let total_earned = add_balance(portfolio.total_earned, amount)?;

    portfolio.available = available;
    portfolio.locked_ninety = locked_ninety;
    portfolio.locked_three_sixty = locked_three_sixty;
    portfolio.total_earned = total_earned;
    Ok(())
}

/// Checked balance addition.
pub(crate) fn add_balance(balance: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
    balance.checked_add(amount).ok_or_else(|| {
        LedgerError::Validation(format!(
            "adding {} to balance {} exceeds the representable range",
            amount, balance
        ))
    })
}

const TRANSACTION_COLUMNS: &str = r#"
    id, owner, kind, amount, gross_amount, available_amount, lock_ninety_amount,
    lock_three_sixty_amount, description, external_event_id, source,
    policy_version, created_at
"#;

const LOCK_COLUMNS: &str = r#"
    id, owner, amount, category, commitment_days, created_at, unlock_at,
    can_upgrade, upgraded_from_lock_id, status
"#;


#[cfg(test)]
mod tests {
    use super::test_support::setup_test_db;
    use super::*;

    #[tokio::test]
    async fn test_unknown_portfolio_is_none() {
        let (repo, _temp) = setup_test_db().await;
        let portfolio = repo
            .get_portfolio(&UserId::new("nobody".to_string()))
            .await
            .expect("query failed");
        assert!(portfolio.is_none());
    }

    #[tokio::test]
    async fn test_status_levels_seeded_in_order() {
        let (repo, _temp) = setup_test_db().await;
        let levels = repo.load_status_levels().await.expect("query failed");
        let names: Vec<_> = levels.iter().map(|l| l.tier_name.as_str()).collect();
        assert_eq!(names, vec!["bronze", "silver", "gold", "platinum", "diamond"]);
        assert_eq!(levels[1].min_locked_three_sixty, Decimal::from(2500u32));
        assert_eq!(levels[1].multiplier.to_canonical_string(), "1.25");
    }

    #[tokio::test]
    async fn test_ensure_portfolio_is_idempotent() {
        let (repo, _temp) = setup_test_db().await;
        let user = UserId::new("u1".to_string());
        let mut conn = repo.pool.acquire().await.unwrap();
        ensure_portfolio(&mut conn, &user, TimeMs::new(1)).await.unwrap();
        ensure_portfolio(&mut conn, &user, TimeMs::new(2)).await.unwrap();
        drop(conn);

        let portfolio = repo.get_portfolio(&user).await.unwrap().unwrap();
        assert!(portfolio.total_earned.is_zero());
        assert!(portfolio.is_consistent());
    }
}
