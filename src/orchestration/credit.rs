//! Credit pipeline: idempotency guard, tier multiplier, split, atomic apply.

use crate::db::{verify_replay, CreditApplied, CreditRecord, Repository};
use crate::domain::{
    Breakdown, Decimal, EarningSource, LedgerTransaction, Lock, StatusLevel, TimeMs,
    TransactionKind, UserId,
};
use crate::engine::{tier_for, SplitPolicyTable, SPLIT_DECIMALS};
use crate::error::LedgerError;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// A balance-affecting event before it is split.
#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub user_id: UserId,
    pub amount: Decimal,
    pub source: EarningSource,
    pub kind: TransactionKind,
    pub description: String,
    pub external_event_id: Option<String>,
    /// Settle the pending commission under `external_event_id` atomically
    /// with the credit; refused when the partner already rejected it.
    pub settles_pending: bool,
}

/// What a credit did, or what the original delivery did on replay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditOutcome {
    pub transaction: LedgerTransaction,
    pub breakdown: Breakdown,
    pub locks: Vec<Lock>,
    pub duplicate: bool,
}

/// Applies credits with the policy table and tier table loaded at startup.
#[derive(Debug)]
pub struct CreditService {
    repo: Arc<Repository>,
    policy: SplitPolicyTable,
    levels: Vec<StatusLevel>,
    max_amount: Decimal,
}

impl CreditService {
    pub fn new(
        repo: Arc<Repository>,
        policy: SplitPolicyTable,
        levels: Vec<StatusLevel>,
        max_amount: Decimal,
    ) -> Self {
        Self {
            repo,
            policy,
            levels,
            max_amount,
        }
    }

    pub fn policy(&self) -> &SplitPolicyTable {
        &self.policy
    }

    pub fn levels(&self) -> &[StatusLevel] {
        &self.levels
    }

    /// Credit `request.amount` (scaled by the tier multiplier where the source
    /// earns one), split it, and apply it in one atomic unit.
    ///
    /// Replays of an `external_event_id` already recorded for the same source
    /// return the original outcome with `duplicate = true` and change nothing.
    ///
    /// # Errors
    /// - `Validation` for amounts outside `(0, max_amount]` or a balance overflow
    /// - `Conflict` when the key is recorded for another user, kind or amount
    /// - `CommissionRejected` when a settling credit meets a rejected commission
    /// - storage errors otherwise
    pub async fn credit(&self, request: CreditRequest, now: TimeMs) -> Result<CreditOutcome, LedgerError> {
        if !request.amount.is_positive() {
            return Err(LedgerError::Validation(
                "credit amount must be greater than zero".to_string(),
            ));
        }
        if request.amount > self.max_amount {
            return Err(LedgerError::Validation(format!(
                "credit amount {} exceeds the maximum of {}",
                request.amount, self.max_amount
            )));
        }

        if let Some(external_id) = request.external_event_id.as_deref() {
            // Settling credits go through the transaction so the pending row moves too.
            if !request.settles_pending {
                if let Some(original) = self
                    .repo
                    .find_transaction_by_key(request.source, external_id)
                    .await?
                {
                    verify_replay(&original, &request.user_id, request.kind, request.amount)?;
                    info!(external_event_id = %external_id, user = %original.owner, "duplicate delivery replayed");
                    return Ok(Self::replayed(original));
                }
            }
        }

        let amount = self.scaled_amount(&request).await?;
        let breakdown = self.policy.split(amount, request.source);
        let rejected_key = request.external_event_id.clone().unwrap_or_default();

        let record = CreditRecord {
            user_id: request.user_id,
            kind: request.kind,
            amount,
            gross_amount: request.amount,
            breakdown,
            source: request.source,
            description: request.description,
            external_event_id: request.external_event_id,
            policy_version: Some(self.policy.version()),
            settles_pending: request.settles_pending,
        };

        match self.repo.apply_credit(record, now).await? {
            CreditApplied::Applied { transaction, locks } => Ok(CreditOutcome {
                breakdown: transaction.breakdown,
                transaction,
                locks,
                duplicate: false,
            }),
            CreditApplied::Duplicate(original) => {
                info!(
                    external_event_id = ?original.external_event_id,
                    user = %original.owner,
                    "concurrent duplicate delivery replayed"
                );
                Ok(Self::replayed(original))
            }
            CreditApplied::Refused => Err(LedgerError::CommissionRejected(rejected_key)),
        }
    }

    async fn scaled_amount(&self, request: &CreditRequest) -> Result<Decimal, LedgerError> {
        if !request.source.earns_multiplier() {
            return Ok(request.amount);
        }
        let locked_three_sixty = self
            .repo
            .get_portfolio(&request.user_id)
            .await?
            .map(|p| p.locked_three_sixty)
            .unwrap_or_default();
        let multiplier = tier_for(locked_three_sixty, &self.levels).multiplier;
        if multiplier == Decimal::one() {
            return Ok(request.amount);
        }
        let scaled = request.amount.checked_mul(multiplier).ok_or_else(|| {
            LedgerError::Validation(format!(
                "credit amount {} times multiplier {} exceeds the representable range",
                request.amount, multiplier
            ))
        })?;
        Ok(scaled.round_down(SPLIT_DECIMALS))
    }

    fn replayed(original: LedgerTransaction) -> CreditOutcome {
        CreditOutcome {
            breakdown: original.breakdown,
            transaction: original,
            locks: Vec::new(),
            duplicate: true,
        }
    }
}
