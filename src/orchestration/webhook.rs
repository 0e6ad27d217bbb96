//! Webhook ingestion: identity resolution, pending storage, crediting.

use super::credit::{CreditOutcome, CreditRequest, CreditService};
use super::payload::{InboundEvent, OrderEvent, StatusTransition};
use crate::db::Repository;
use crate::domain::{
    Breakdown, CommissionEvent, CommissionStatus, Decimal, EarningSource, TimeMs, TransactionKind,
    UserId,
};
use crate::error::LedgerError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Response body of the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Credited now, or replayed from the original delivery.
    #[serde(rename_all = "camelCase")]
    Processed {
        external_event_id: String,
        user_id: UserId,
        amount: Decimal,
        breakdown: Breakdown,
        duplicate: bool,
    },
    /// Stored until a completed status arrives.
    #[serde(rename_all = "camelCase")]
    PendingStored { external_event_id: String },
    /// The partner already rejected this commission; nothing was credited.
    #[serde(rename_all = "camelCase")]
    Rejected { external_event_id: String },
    /// Recognised but not creditable.
    #[serde(rename_all = "camelCase")]
    AcknowledgedNotActionable { external_status: String },
    #[serde(rename_all = "camelCase")]
    TransitionApplied {
        new_status: String,
        results: Vec<TransitionResult>,
    },
    /// Shape not recognised; acknowledged so the partner does not retry.
    AcknowledgedUnprocessed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    pub external_event_id: String,
    pub result: TransitionDisposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDisposition {
    Credited,
    Duplicate,
    Rejected,
    Unchanged,
    Unknown,
}

/// Routes canonical events into storage and the credit pipeline.
#[derive(Debug)]
pub struct WebhookIngestor {
    repo: Arc<Repository>,
    credits: Arc<CreditService>,
}

impl WebhookIngestor {
    pub fn new(repo: Arc<Repository>, credits: Arc<CreditService>) -> Self {
        Self { repo, credits }
    }

    /// Handle one normalised event.
    ///
    /// Crediting a commission settles its pending row in the same transaction,
    /// so a completion racing a rejection either credits and completes the row
    /// or credits nothing.
    ///
    /// # Errors
    /// `UnresolvableIdentity` when an order has neither a user id nor a known
    /// tracking id; `Conflict` when an order id is replayed for another user
    /// or amount; storage errors otherwise.
    pub async fn ingest(&self, event: InboundEvent, now: TimeMs) -> Result<WebhookOutcome, LedgerError> {
        match event {
            InboundEvent::Order(order) => self.ingest_order(order, now).await,
            InboundEvent::Transition(transition) => self.ingest_transition(transition, now).await,
            InboundEvent::Unrecognized => {
                info!("unrecognized webhook shape acknowledged");
                Ok(WebhookOutcome::AcknowledgedUnprocessed)
            }
        }
    }

    async fn ingest_order(&self, order: OrderEvent, now: TimeMs) -> Result<WebhookOutcome, LedgerError> {
        match order.status {
            CommissionStatus::Completed => {
                let event = self.resolve(&order).await?;
                match self.credit_commission(&event, now).await {
                    Ok(outcome) => Ok(processed(&event, outcome)),
                    Err(LedgerError::CommissionRejected(_)) => {
                        warn!(external_event_id = %event.external_event_id, "completed order for rejected commission ignored");
                        Ok(WebhookOutcome::Rejected {
                            external_event_id: event.external_event_id,
                        })
                    }
                    Err(err) => Err(err),
                }
            }
            CommissionStatus::Pending => {
                let event = self.resolve(&order).await?;
                let stored = self.repo.upsert_pending_commission(&event, now).await?;
                info!(
                    external_event_id = %event.external_event_id,
                    user = %event.user_id,
                    new = stored,
                    "pending commission stored"
                );
                Ok(WebhookOutcome::PendingStored {
                    external_event_id: event.external_event_id,
                })
            }
            CommissionStatus::Rejected => {
                let marked = self
                    .repo
                    .mark_pending_status(&order.order_id, CommissionStatus::Rejected, now)
                    .await?;
                info!(external_event_id = %order.order_id, marked, "commission rejected by partner");
                Ok(WebhookOutcome::AcknowledgedNotActionable {
                    external_status: order.raw_status,
                })
            }
            CommissionStatus::Unrecognized => {
                info!(
                    external_event_id = %order.order_id,
                    status = %order.raw_status,
                    "order status not actionable"
                );
                Ok(WebhookOutcome::AcknowledgedNotActionable {
                    external_status: order.raw_status,
                })
            }
        }
    }

    async fn ingest_transition(
        &self,
        transition: StatusTransition,
        now: TimeMs,
    ) -> Result<WebhookOutcome, LedgerError> {
        let mut results = Vec::with_capacity(transition.transaction_ids.len());

        for id in &transition.transaction_ids {
            let Some(pending) = self.repo.get_pending_commission(id).await? else {
                results.push(TransitionResult {
                    external_event_id: id.clone(),
                    result: TransitionDisposition::Unknown,
                });
                continue;
            };

            let result = match transition.new_status {
                CommissionStatus::Completed if pending.event.status == CommissionStatus::Rejected => {
                    warn!(external_event_id = %id, "completion for rejected commission ignored");
                    TransitionDisposition::Rejected
                }
                CommissionStatus::Completed => match self.credit_commission(&pending.event, now).await {
                    Ok(outcome) if outcome.duplicate => TransitionDisposition::Duplicate,
                    Ok(_) => TransitionDisposition::Credited,
                    Err(LedgerError::CommissionRejected(_)) => {
                        warn!(external_event_id = %id, "completion lost to a concurrent rejection");
                        TransitionDisposition::Rejected
                    }
                    Err(err) => return Err(err),
                },
                // Already credited; the ledger is credit-only.
                CommissionStatus::Rejected if pending.event.status == CommissionStatus::Completed => {
                    TransitionDisposition::Unchanged
                }
                CommissionStatus::Rejected => {
                    if self
                        .repo
                        .mark_pending_status(id, CommissionStatus::Rejected, now)
                        .await?
                    {
                        TransitionDisposition::Rejected
                    } else {
                        self.settled_disposition(id).await?
                    }
                }
                CommissionStatus::Pending | CommissionStatus::Unrecognized => {
                    TransitionDisposition::Unchanged
                }
            };
            results.push(TransitionResult {
                external_event_id: id.clone(),
                result,
            });
        }

        info!(
            event_type = %transition.event_type,
            new_status = %transition.raw_status,
            count = results.len(),
            "status transition processed"
        );

        Ok(WebhookOutcome::TransitionApplied {
            new_status: transition.raw_status,
            results,
        })
    }

    /// Disposition of a reject that found the row no longer pending.
    async fn settled_disposition(&self, id: &str) -> Result<TransitionDisposition, LedgerError> {
        let current = self.repo.get_pending_commission(id).await?;
        Ok(match current.map(|p| p.event.status) {
            Some(CommissionStatus::Completed) => TransitionDisposition::Unchanged,
            _ => TransitionDisposition::Rejected,
        })
    }

    /// Attach a user to an order, via the tracking table when needed.
    async fn resolve(&self, order: &OrderEvent) -> Result<CommissionEvent, LedgerError> {
        let (user_id, tracked_brand) = match (&order.user_id, &order.tracking_id) {
            (Some(user), _) => (user.clone(), None),
            (None, Some(tracking_id)) => match self.repo.resolve_tracking_id(tracking_id).await? {
                Some((user, brand)) => (user, Some(brand)),
                None => {
                    return Err(LedgerError::UnresolvableIdentity(format!(
                        "unknown tracking id {}",
                        tracking_id
                    )))
                }
            },
            (None, None) => {
                return Err(LedgerError::UnresolvableIdentity(format!(
                    "order {} carries neither user_id nor tracking_id",
                    order.order_id
                )))
            }
        };

        let source_brand = order
            .source
            .clone()
            .or(tracked_brand)
            .unwrap_or_else(|| "unknown".to_string());

        Ok(CommissionEvent {
            external_event_id: order.order_id.clone(),
            user_id,
            amount: order.amount,
            source_brand,
            status: order.status,
        })
    }

    async fn credit_commission(
        &self,
        event: &CommissionEvent,
        now: TimeMs,
    ) -> Result<CreditOutcome, LedgerError> {
        self.credits
            .credit(
                CreditRequest {
                    user_id: event.user_id.clone(),
                    amount: event.amount,
                    source: EarningSource::AffiliatePurchase,
                    kind: TransactionKind::Earned,
                    description: format!("Affiliate purchase at {}", event.source_brand),
                    external_event_id: Some(event.external_event_id.clone()),
                    settles_pending: true,
                },
                now,
            )
            .await
    }
}

fn processed(event: &CommissionEvent, outcome: CreditOutcome) -> WebhookOutcome {
    WebhookOutcome::Processed {
        external_event_id: event.external_event_id.clone(),
        user_id: outcome.transaction.owner,
        amount: outcome.transaction.amount,
        breakdown: outcome.breakdown,
        duplicate: outcome.duplicate,
    }
}
