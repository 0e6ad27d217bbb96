//! Tracking links and pending commissions.

use super::{parsed_column, Repository};
use crate::domain::{CommissionEvent, CommissionStatus, TimeMs, UserId};
use sqlx::Row;

/// A stored commission awaiting a completed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommission {
    pub event: CommissionEvent,
    pub received_at: TimeMs,
}

impl Repository {
    /// Register a tracking id for `user` at `brand`. Existing ids are left as-is.
    ///
    /// Returns false when the tracking id was already registered.
    pub async fn insert_tracking_link(
        &self,
        tracking_id: &str,
        user: &UserId,
        brand: &str,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO tracking_links (tracking_id, user_id, brand, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(tracking_id) DO NOTHING
            "#,
        )
        .bind(tracking_id)
        .bind(user.as_str())
        .bind(brand)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Resolve a tracking id to `(user, brand)`.
    pub async fn resolve_tracking_id(
        &self,
        tracking_id: &str,
    ) -> Result<Option<(UserId, String)>, sqlx::Error> {
        let row = sqlx::query("SELECT user_id, brand FROM tracking_links WHERE tracking_id = ?")
            .bind(tracking_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok((
                UserId::new(r.try_get("user_id")?),
                r.try_get::<String, _>("brand")?,
            ))
        })
        .transpose()
    }

    /// Store a not-yet-creditable commission. Replays keep the first row.
    pub async fn upsert_pending_commission(
        &self,
        event: &CommissionEvent,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO pending_commissions (
                external_event_id, user_id, amount, source_brand, status, received_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_event_id) DO NOTHING
            "#,
        )
        .bind(&event.external_event_id)
        .bind(event.user_id.as_str())
        .bind(event.amount.to_canonical_string())
        .bind(&event.source_brand)
        .bind(event.status.as_str())
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_pending_commission(
        &self,
        external_event_id: &str,
    ) -> Result<Option<PendingCommission>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT external_event_id, user_id, amount, source_brand, status, received_at
            FROM pending_commissions
            WHERE external_event_id = ?
            "#,
        )
        .bind(external_event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(PendingCommission {
                event: CommissionEvent {
                    external_event_id: r.try_get("external_event_id")?,
                    user_id: UserId::new(r.try_get("user_id")?),
                    amount: parsed_column(&r, "amount")?,
                    source_brand: r.try_get("source_brand")?,
                    status: parsed_column(&r, "status")?,
                },
                received_at: TimeMs::new(r.try_get("received_at")?),
            })
        })
        .transpose()
    }

    /// Move a pending row to `status`. Completed and rejected are terminal.
    pub async fn mark_pending_status(
        &self,
        external_event_id: &str,
        status: CommissionStatus,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE pending_commissions
            SET status = ?, updated_at = ?
            WHERE external_event_id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(now.as_ms())
        .bind(external_event_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
