//! Lock manager service: user commitments, upgrades, releases, and the
//! scheduled release sweep.

use crate::db::{Repository, UpgradeApplied};
use crate::domain::{Decimal, LedgerTransaction, Lock, LockCategory, TimeMs, UserId};
use crate::engine::LockMinimums;
use crate::error::LedgerError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SWEEP_BATCH: u32 = 200;

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub released: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct LockService {
    repo: Arc<Repository>,
    minimums: LockMinimums,
}

impl LockService {
    pub fn new(repo: Arc<Repository>, minimums: LockMinimums) -> Self {
        Self { repo, minimums }
    }

    /// Move `amount` from available into a new lock.
    pub async fn commit(
        &self,
        user: &UserId,
        amount: Decimal,
        category: LockCategory,
        now: TimeMs,
    ) -> Result<(Lock, LedgerTransaction), LedgerError> {
        self.repo
            .commit_lock(user, amount, category, &self.minimums, now)
            .await
    }

    pub async fn upgrade(&self, lock_id: &str, now: TimeMs) -> Result<UpgradeApplied, LedgerError> {
        self.repo.upgrade_lock(lock_id, now).await
    }

    pub async fn release(&self, lock_id: &str, now: TimeMs) -> Result<Lock, LedgerError> {
        self.repo.release_lock(lock_id, now).await
    }

    /// Release every Active lock due at `now`. Each release is its own atomic
    /// unit; a failed release is logged and skipped.
    pub async fn sweep_due(&self, now: TimeMs) -> Result<SweepReport, LedgerError> {
        let mut report = SweepReport::default();
        loop {
            let due = self.repo.due_lock_ids(now, SWEEP_BATCH).await?;
            if due.is_empty() {
                break;
            }
            let batch_len = due.len();
            let mut progressed = false;
            for lock_id in due {
                match self.repo.release_lock(&lock_id, now).await {
                    Ok(_) => {
                        report.released += 1;
                        progressed = true;
                    }
                    Err(err) => {
                        warn!(lock_id = %lock_id, error = %err, "scheduled release failed");
                        report.failed += 1;
                    }
                }
            }
            // A batch that released nothing would be selected again forever.
            if !progressed || batch_len < SWEEP_BATCH as usize {
                break;
            }
        }

        if report.released > 0 || report.failed > 0 {
            info!(released = report.released, failed = report.failed, "lock sweep finished");
        }
        Ok(report)
    }

    /// Run `sweep_due` every `interval` until the task is dropped.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_due(TimeMs::now()).await {
                warn!(error = %err, "lock sweep aborted");
            }
        }
    }
}
