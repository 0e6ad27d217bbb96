//! Idempotent credits and the transaction audit trail.

use super::{
    credit_portfolio, ensure_portfolio, fetch_existing_portfolio, fetch_transaction_by_key,
    insert_lock, insert_transaction, store_balances, transaction_from_row, Repository,
    TRANSACTION_COLUMNS,
};
use crate::domain::{
    Breakdown, Decimal, EarningSource, LedgerTransaction, Lock, LockCategory, TimeMs,
    TransactionKind, UserId,
};
use crate::error::LedgerError;
use sqlx::{Row, SqliteConnection};

/// A credit ready to be applied: amount already split into buckets.
#[derive(Debug, Clone)]
pub struct CreditRecord {
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Amount credited, after any tier multiplier.
    pub amount: Decimal,
    /// Amount as received; replays must match it.
    pub gross_amount: Decimal,
    pub breakdown: Breakdown,
    pub source: EarningSource,
    pub description: String,
    pub external_event_id: Option<String>,
    pub policy_version: Option<u32>,
    /// Settle the pending commission stored under `external_event_id` in the
    /// same transaction as the credit.
    pub settles_pending: bool,
}

/// Outcome of `apply_credit`.
#[derive(Debug, Clone)]
pub enum CreditApplied {
    /// Balances moved; `locks` holds one entry per positive lock bucket.
    Applied {
        transaction: LedgerTransaction,
        locks: Vec<Lock>,
    },
    /// The key was already recorded for the same user and amount; nothing changed.
    Duplicate(LedgerTransaction),
    /// The pending commission was rejected first; nothing changed.
    Refused,
}

/// Check that a replayed key carries the same owner, kind and amount as the
/// delivery that first recorded it.
///
/// # Errors
/// `Conflict` on any mismatch.
pub(crate) fn verify_replay(
    original: &LedgerTransaction,
    user_id: &UserId,
    kind: TransactionKind,
    gross_amount: Decimal,
) -> Result<(), LedgerError> {
    let key = original.external_event_id.as_deref().unwrap_or_default();
    if &original.owner != user_id {
        return Err(LedgerError::Conflict(format!(
            "event {} from {} is already recorded for another user",
            key, original.source
        )));
    }
    if original.kind != kind || original.gross_amount != gross_amount {
        return Err(LedgerError::Conflict(format!(
            "event {} from {} was recorded as {} {}, replay carries {} {}",
            key,
            original.source,
            original.kind.as_str(),
            original.gross_amount,
            kind.as_str(),
            gross_amount
        )));
    }
    Ok(())
}

/// Move the pending row for `external_event_id` to completed.
///
/// Returns false only when the row exists and was rejected. A missing row or
/// one already completed settles trivially.
async fn settle_pending(
    conn: &mut SqliteConnection,
    external_event_id: &str,
    now: TimeMs,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pending_commissions
        SET status = 'completed', updated_at = ?
        WHERE external_event_id = ? AND status = 'pending'
        "#,
    )
    .bind(now.as_ms())
    .bind(external_event_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() > 0 {
        return Ok(true);
    }

    let status: Option<String> =
        sqlx::query("SELECT status FROM pending_commissions WHERE external_event_id = ?")
            .bind(external_event_id)
            .fetch_optional(&mut *conn)
            .await?
            .map(|row| row.try_get("status"))
            .transpose()?;
    Ok(status.as_deref() != Some("rejected"))
}

impl Repository {
    /// Apply a credit in one atomic unit.
    ///
    /// The audit row is inserted before balances move. If its key already
    /// exists for the same source, the original row is verified against the
    /// record and returned as a duplicate. When `settles_pending` is set the
    /// pending commission is moved to completed inside the same transaction;
    /// a commission the partner already rejected rolls everything back.
    ///
    /// # Errors
    /// `Conflict` when a replayed key belongs to a different user or amount,
    /// `Validation` when a balance would overflow, `StorageConflict` when
    /// SQLite stays busy, `Storage` otherwise.
    pub async fn apply_credit(
        &self,
        record: CreditRecord,
        now: TimeMs,
    ) -> Result<CreditApplied, LedgerError> {
        let mut tx = self.pool.begin().await?;
        ensure_portfolio(&mut tx, &record.user_id, now).await?;

        let transaction = LedgerTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            owner: record.user_id.clone(),
            kind: record.kind,
            amount: record.amount,
            gross_amount: record.gross_amount,
            breakdown: record.breakdown,
            description: record.description,
            external_event_id: record.external_event_id.clone(),
            source: record.source,
            policy_version: record.policy_version,
            created_at: now,
        };

        let pending_key = record
            .external_event_id
            .as_deref()
            .filter(|_| record.settles_pending);

        if !insert_transaction(&mut tx, &transaction).await? {
            let external_id = record.external_event_id.as_deref().unwrap_or_default();
            let Some(original) = fetch_transaction_by_key(&mut tx, record.source, external_id).await?
            else {
                return Err(LedgerError::StorageConflict(format!(
                    "event {} conflicted but no original row was found",
                    external_id
                )));
            };
            verify_replay(&original, &record.user_id, record.kind, record.gross_amount)?;
            if let Some(key) = pending_key {
                settle_pending(&mut tx, key, now).await?;
            }
            tx.commit().await?;
            return Ok(CreditApplied::Duplicate(original));
        }

        if let Some(key) = pending_key {
            if !settle_pending(&mut tx, key, now).await? {
                drop(tx);
                tracing::warn!(external_event_id = %key, "credit refused, commission was rejected");
                return Ok(CreditApplied::Refused);
            }
        }

        let mut portfolio = fetch_existing_portfolio(&mut tx, &record.user_id).await?;
        credit_portfolio(&mut portfolio, &record.breakdown, record.amount)?;
        store_balances(&mut tx, &portfolio, now).await?;

        let mut locks = Vec::new();
        for (bucket, category) in [
            (record.breakdown.lock_ninety, LockCategory::NinetyDay),
            (record.breakdown.lock_three_sixty, LockCategory::ThreeSixtyDay),
        ] {
            if bucket.is_positive() {
                let lock = Lock::new_active(record.user_id.clone(), bucket, category, now);
                insert_lock(&mut tx, &lock).await?;
                locks.push(lock);
            }
        }

        tx.commit().await?;

        tracing::info!(
            user = %record.user_id,
            source = %record.source,
            amount = %record.amount,
            locks = locks.len(),
            "credit applied"
        );

        Ok(CreditApplied::Applied { transaction, locks })
    }

    /// Look up a transaction by its idempotency key within `source`.
    pub async fn find_transaction_by_key(
        &self,
        source: EarningSource,
        external_event_id: &str,
    ) -> Result<Option<LedgerTransaction>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_transaction_by_key(&mut conn, source, external_event_id).await
    }

    /// Transactions for a user, newest first.
    pub async fn list_transactions(
        &self,
        user: &UserId,
        limit: u32,
    ) -> Result<Vec<LedgerTransaction>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM ledger_transactions WHERE owner = ? ORDER BY seq DESC LIMIT ?",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;
    use crate::domain::{CommissionEvent, CommissionStatus};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn affiliate_credit(user: &str, event: &str) -> CreditRecord {
        CreditRecord {
            user_id: UserId::new(user.to_string()),
            kind: TransactionKind::Earned,
            amount: dec("1500"),
            gross_amount: dec("1500"),
            breakdown: Breakdown {
                available: dec("25"),
                lock_ninety: dec("1225"),
                lock_three_sixty: dec("250"),
            },
            source: EarningSource::AffiliatePurchase,
            description: "Affiliate purchase".to_string(),
            external_event_id: Some(event.to_string()),
            policy_version: Some(2),
            settles_pending: false,
        }
    }

    #[tokio::test]
    async fn test_apply_credit_moves_balances_and_creates_locks() {
        let (repo, _temp) = setup_test_db().await;
        let applied = repo
            .apply_credit(affiliate_credit("u1", "evt-1"), TimeMs::new(1_000))
            .await
            .unwrap();

        let CreditApplied::Applied { transaction, locks } = applied else {
            panic!("expected Applied");
        };
        assert_eq!(transaction.amount, dec("1500"));
        assert_eq!(locks.len(), 2);

        let portfolio = repo
            .get_portfolio(&UserId::new("u1".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(portfolio.available, dec("25"));
        assert_eq!(portfolio.locked_ninety, dec("1225"));
        assert_eq!(portfolio.locked_three_sixty, dec("250"));
        assert_eq!(portfolio.total_earned, dec("1500"));
    }

    #[tokio::test]
    async fn test_duplicate_event_returns_original() {
        let (repo, _temp) = setup_test_db().await;
        let first = repo
            .apply_credit(affiliate_credit("u1", "evt-1"), TimeMs::new(1_000))
            .await
            .unwrap();
        let second = repo
            .apply_credit(affiliate_credit("u1", "evt-1"), TimeMs::new(2_000))
            .await
            .unwrap();

        let CreditApplied::Applied { transaction: original, .. } = first else {
            panic!("expected Applied");
        };
        let CreditApplied::Duplicate(replayed) = second else {
            panic!("expected Duplicate");
        };
        assert_eq!(replayed.id, original.id);

        let user = UserId::new("u1".to_string());
        let portfolio = repo.get_portfolio(&user).await.unwrap().unwrap();
        assert_eq!(portfolio.total_earned, dec("1500"));
        assert_eq!(repo.list_transactions(&user, 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_transactions_newest_first() {
        let (repo, _temp) = setup_test_db().await;
        repo.apply_credit(affiliate_credit("u1", "a"), TimeMs::new(1))
            .await
            .unwrap();
        repo.apply_credit(affiliate_credit("u1", "b"), TimeMs::new(2))
            .await
            .unwrap();

        let listed = repo
            .list_transactions(&UserId::new("u1".to_string()), 10)
            .await
            .unwrap();
        let ids: Vec<_> = listed
            .iter()
            .map(|t| t.external_event_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_replay_for_other_user_or_amount_conflicts() {
        let (repo, _temp) = setup_test_db().await;
        repo.apply_credit(affiliate_credit("u1", "evt-1"), TimeMs::new(1))
            .await
            .unwrap();

        let other_user = repo
            .apply_credit(affiliate_credit("u2", "evt-1"), TimeMs::new(2))
            .await;
        assert!(matches!(other_user, Err(LedgerError::Conflict(_))));

        let mut other_amount = affiliate_credit("u1", "evt-1");
        other_amount.gross_amount = dec("9000");
        let result = repo.apply_credit(other_amount, TimeMs::new(3)).await;
        assert!(matches!(result, Err(LedgerError::Conflict(_))));

        assert!(repo
            .get_portfolio(&UserId::new("u2".to_string()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_same_key_from_another_source_is_independent() {
        let (repo, _temp) = setup_test_db().await;
        repo.apply_credit(affiliate_credit("u1", "shared-7"), TimeMs::new(1))
            .await
            .unwrap();

        let mut manual = affiliate_credit("u2", "shared-7");
        manual.source = EarningSource::Manual;
        let applied = repo.apply_credit(manual, TimeMs::new(2)).await.unwrap();
        assert!(matches!(applied, CreditApplied::Applied { .. }));

        let u2 = repo
            .get_portfolio(&UserId::new("u2".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(u2.total_earned, dec("1500"));
    }

    #[tokio::test]
    async fn test_rejected_pending_refuses_credit() {
        let (repo, _temp) = setup_test_db().await;
        let event = CommissionEvent {
            external_event_id: "R1".to_string(),
            user_id: UserId::new("u1".to_string()),
            amount: dec("1500"),
            source_brand: "Brand".to_string(),
            status: CommissionStatus::Pending,
        };
        repo.upsert_pending_commission(&event, TimeMs::new(0))
            .await
            .unwrap();
        repo.mark_pending_status("R1", CommissionStatus::Rejected, TimeMs::new(1))
            .await
            .unwrap();

        let mut record = affiliate_credit("u1", "R1");
        record.settles_pending = true;
        let applied = repo.apply_credit(record, TimeMs::new(2)).await.unwrap();
        assert!(matches!(applied, CreditApplied::Refused));

        let user = UserId::new("u1".to_string());
        assert!(repo.get_portfolio(&user).await.unwrap().is_none());
        assert!(repo.list_transactions(&user, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settling_credit_completes_pending_row() {
        let (repo, _temp) = setup_test_db().await;
        let event = CommissionEvent {
            external_event_id: "S1".to_string(),
            user_id: UserId::new("u1".to_string()),
            amount: dec("1500"),
            source_brand: "Brand".to_string(),
            status: CommissionStatus::Pending,
        };
        repo.upsert_pending_commission(&event, TimeMs::new(0))
            .await
            .unwrap();

        let mut record = affiliate_credit("u1", "S1");
        record.settles_pending = true;
        repo.apply_credit(record, TimeMs::new(1)).await.unwrap();

        let stored = repo.get_pending_commission("S1").await.unwrap().unwrap();
        assert_eq!(stored.event.status, CommissionStatus::Completed);
        // A late reject cannot move a settled row.
        assert!(!repo
            .mark_pending_status("S1", CommissionStatus::Rejected, TimeMs::new(2))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_balance_overflow_is_validation_error() {
        let (repo, _temp) = setup_test_db().await;
        let huge = dec("79228162514264337593543950335");
        let mut record = affiliate_credit("u1", "big-1");
        record.amount = huge;
        record.gross_amount = huge;
        record.breakdown = Breakdown {
            available: huge,
            lock_ninety: Decimal::zero(),
            lock_three_sixty: Decimal::zero(),
        };
        repo.apply_credit(record.clone(), TimeMs::new(1)).await.unwrap();

        record.external_event_id = Some("big-2".to_string());
        let result = repo.apply_credit(record, TimeMs::new(2)).await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        let user = UserId::new("u1".to_string());
        let portfolio = repo.get_portfolio(&user).await.unwrap().unwrap();
        assert_eq!(portfolio.available, huge);
        assert_eq!(repo.list_transactions(&user, 10).await.unwrap().len(), 1);
    }
}
