use crate::domain::batch::{
    Approval, ApprovalAction, ApproverRole, AuditEvent, BatchId, BatchStatus, EventLevel,
    PayrollBatch,
};
use crate::domain::fx::FxSnapshot;
use crate::domain::payee::{PayeeStatus, PayrollPayee};
use crate::domain::ports::{BatchStoreBox, Clock};
use crate::domain::receipt::{PaymentReceipt, ReceiptUpdate};
use crate::error::{PayrollError, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Canonical home of payroll batches and the only way to mutate them.
///
/// Every mutation loads the batch, applies the change to a copy and stores the
/// copy back, holding a per-batch lock for the whole sequence. A failed
/// mutation leaves the stored batch untouched. Mutations of different batches
/// never wait on each other.
pub struct BatchService {
    store: BatchStoreBox,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<BatchId, Arc<Mutex<()>>>>,
}

impl BatchService {
    pub fn new(store: BatchStoreBox, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn lock_for(&self, id: &BatchId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }

    /// Drops the batch's lock entry once no other mutation holds or awaits it.
    async fn release(&self, id: &BatchId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One handle in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    /// Applies `f` to the batch under its lock and persists the result.
    pub(crate) async fn mutate<T, F>(&self, id: &BatchId, f: F) -> Result<T>
    where
        F: FnOnce(&mut PayrollBatch) -> Result<T>,
    {
        let lock = self.lock_for(id).await;
        let out = {
            let _guard = lock.lock().await;
            self.apply(id, f).await
        };
        self.release(id, lock).await;
        out
    }

    async fn apply<T, F>(&self, id: &BatchId, f: F) -> Result<T>
    where
        F: FnOnce(&mut PayrollBatch) -> Result<T>,
    {
        let mut batch = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| PayrollError::BatchNotFound(id.to_string()))?;
        let out = f(&mut batch)?;
        self.store.store(batch).await?;
        Ok(out)
    }

    /// Creates a `Draft` batch with no receipts, approvals or events.
    pub async fn create_batch(
        &self,
        period: &str,
        payees: Vec<PayrollPayee>,
        actor_id: &str,
    ) -> Result<BatchId> {
        if period.trim().is_empty() {
            return Err(PayrollError::ValidationError(
                "Batch period must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for payee in &payees {
            if !seen.insert(payee.worker_id.as_str()) {
                return Err(PayrollError::ValidationError(format!(
                    "Duplicate payee {} in batch",
                    payee.worker_id
                )));
            }
        }

        let id = BatchId::generate();
        let batch = PayrollBatch::new(id.clone(), period, payees, actor_id, self.now());
        tracing::info!(batch_id = %id, period, payees = batch.payees.len(), "batch created");
        self.store.store(batch).await?;
        Ok(id)
    }

    pub async fn get_batch(&self, id: &BatchId) -> Result<PayrollBatch> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| PayrollError::BatchNotFound(id.to_string()))
    }

    pub async fn list_batches(&self) -> Result<Vec<PayrollBatch>> {
        self.store.get_all().await
    }

    /// Moves the batch to `status` if the lifecycle allows it.
    pub async fn update_batch_status(&self, id: &BatchId, status: BatchStatus) -> Result<()> {
        self.mutate(id, |batch| {
            let from = batch.status;
            batch.transition_to(status).inspect_err(|_| {
                tracing::warn!(batch_id = %id, ?from, to = ?status, "rejected batch transition");
            })?;
            tracing::info!(batch_id = %id, ?from, to = ?status, "batch status changed");
            Ok(())
        })
        .await
    }

    pub async fn set_fx_snapshot(&self, id: &BatchId, snapshot: FxSnapshot) -> Result<()> {
        self.mutate(id, |batch| {
            batch.fx_snapshot = Some(snapshot);
            Ok(())
        })
        .await
    }

    /// Locks the current FX snapshot for `ttl_secs`. The lock only drives the
    /// displayed countdown.
    pub async fn lock_fx(&self, id: &BatchId, actor: &str, ttl_secs: u64) -> Result<()> {
        let now = self.now();
        self.mutate(id, |batch| {
            let snapshot = batch.fx_snapshot.as_mut().ok_or_else(|| {
                PayrollError::ValidationError("Batch has no FX snapshot to lock".to_string())
            })?;
            snapshot.lock(now, ttl_secs);
            batch.events.push(AuditEvent::info(
                actor,
                format!("FX rates locked for {ttl_secs}s"),
                now,
            ));
            Ok(())
        })
        .await
    }

    pub async fn add_approval(&self, id: &BatchId, approval: Approval) -> Result<()> {
        self.mutate(id, |batch| {
            batch.approvals.push(approval);
            Ok(())
        })
        .await
    }

    pub async fn submit_for_approval(&self, id: &BatchId, actor: &str) -> Result<()> {
        let now = self.now();
        self.mutate(id, |batch| {
            batch.transition_to(BatchStatus::AwaitingApproval)?;
            batch
                .events
                .push(AuditEvent::info(actor, "Submitted for approval", now));
            Ok(())
        })
        .await?;
        tracing::info!(batch_id = %id, actor, "batch submitted for approval");
        Ok(())
    }

    pub async fn approve(
        &self,
        id: &BatchId,
        actor: &str,
        role: ApproverRole,
        comment: Option<String>,
    ) -> Result<()> {
        let now = self.now();
        self.mutate(id, |batch| {
            batch.transition_to(BatchStatus::Approved)?;
            batch.approvals.push(Approval {
                actor_id: actor.to_string(),
                role,
                action: ApprovalAction::Approved,
                comment,
                at: now,
            });
            batch
                .events
                .push(AuditEvent::info(actor, format!("Approved as {role:?}"), now));
            Ok(())
        })
        .await?;
        tracing::info!(batch_id = %id, actor, ?role, "batch approved");
        Ok(())
    }

    /// Sends the batch back to `Draft`. A reason is mandatory.
    pub async fn decline(
        &self,
        id: &BatchId,
        actor: &str,
        role: ApproverRole,
        reason: &str,
    ) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(PayrollError::ValidationError(
                "A reason is required to decline a batch".to_string(),
            ));
        }
        let now = self.now();
        self.mutate(id, |batch| {
            if batch.status != BatchStatus::AwaitingApproval {
                return Err(PayrollError::InvalidBatchTransition {
                    from: batch.status,
                    to: BatchStatus::Draft,
                });
            }
            batch.transition_to(BatchStatus::Draft)?;
            batch.approvals.push(Approval {
                actor_id: actor.to_string(),
                role,
                action: ApprovalAction::Declined,
                comment: Some(reason.to_string()),
                at: now,
            });
            batch.events.push(AuditEvent::new(
                actor,
                format!("Declined: {reason}"),
                EventLevel::Warning,
                now,
            ));
            Ok(())
        })
        .await?;
        tracing::warn!(batch_id = %id, actor, reason, "batch declined");
        Ok(())
    }

    pub async fn add_event(&self, id: &BatchId, event: AuditEvent) -> Result<()> {
        self.mutate(id, |batch| {
            batch.events.push(event);
            Ok(())
        })
        .await
    }

    /// Stores `receipt`, replacing any receipt already held for the same payee.
    /// A replacement must not move the payee's receipt status backwards.
    pub async fn add_receipt(&self, id: &BatchId, receipt: PaymentReceipt) -> Result<()> {
        self.mutate(id, |batch| batch.record_receipt(receipt)).await
    }

    /// Merges `update` into the payee's receipt and returns the merged receipt.
    pub async fn update_receipt(
        &self,
        id: &BatchId,
        payee_id: &str,
        update: ReceiptUpdate,
    ) -> Result<PaymentReceipt> {
        self.mutate(id, |batch| {
            let receipt =
                batch
                    .receipt_for_mut(payee_id)
                    .ok_or_else(|| PayrollError::ReceiptNotFound {
                        batch_id: id.to_string(),
                        payee_id: payee_id.to_string(),
                    })?;
            receipt.apply(update)?;
            tracing::debug!(batch_id = %id, payee_id, status = ?receipt.status, "receipt updated");
            Ok(receipt.clone())
        })
        .await
    }

    pub async fn set_payee_status(
        &self,
        id: &BatchId,
        payee_id: &str,
        status: PayeeStatus,
    ) -> Result<()> {
        self.mutate(id, |batch| {
            let payee = batch
                .payee_mut(payee_id)
                .ok_or_else(|| PayrollError::PayeeNotFound {
                    batch_id: id.to_string(),
                    payee_id: payee_id.to_string(),
                })?;
            payee.status = status;
            Ok(())
        })
        .await
    }

    /// Drops the payee from the batch. Any receipt already issued for the
    /// payee stays in `receipts`.
    pub async fn remove_payee(&self, id: &BatchId, payee_id: &str) -> Result<PayrollPayee> {
        let removed = self
            .mutate(id, |batch| {
                let idx = batch
                    .payees
                    .iter()
                    .position(|p| p.worker_id == payee_id)
                    .ok_or_else(|| PayrollError::PayeeNotFound {
                        batch_id: id.to_string(),
                        payee_id: payee_id.to_string(),
                    })?;
                Ok(batch.payees.remove(idx))
            })
            .await?;
        tracing::info!(batch_id = %id, payee_id, "payee removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fx::FxQuote;
    use crate::domain::money::{CurrencyCode, Money, Rate};
    use crate::domain::receipt::ReceiptStatus;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::in_memory::InMemoryBatchStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn service() -> BatchService {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap());
        BatchService::new(Box::new(InMemoryBatchStore::new()), Arc::new(clock))
    }

    fn payees(ids: &[&str]) -> Vec<PayrollPayee> {
        ids.iter()
            .map(|id| {
                PayrollPayee::new(
                    id,
                    "Worker",
                    CurrencyCode::new("EUR").unwrap(),
                    Money::new(dec!(2500)),
                )
            })
            .collect()
    }

    fn receipt(payee_id: &str) -> PaymentReceipt {
        PaymentReceipt::initiated(
            payee_id,
            "PRV-1".to_string(),
            Money::new(dec!(2500)),
            CurrencyCode::new("EUR").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_batch_starts_empty_draft() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a", "b"]), "admin").await.unwrap();

        let batch = svc.get_batch(&id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Draft);
        assert_eq!(batch.payees.len(), 2);
        assert!(batch.receipts.is_empty());
        assert!(batch.approvals.is_empty());
        assert!(batch.events.is_empty());
        assert_eq!(batch.created_by, "admin");
    }

    #[tokio::test]
    async fn test_create_batch_validation() {
        let svc = service();
        assert!(matches!(
            svc.create_batch("  ", payees(&["a"]), "admin").await,
            Err(PayrollError::ValidationError(_))
        ));
        assert!(matches!(
            svc.create_batch("2026-10", payees(&["a", "a"]), "admin").await,
            Err(PayrollError::ValidationError(_))
        ));
        assert!(svc.list_batches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let svc = service();
        let missing = BatchId::from("nope");
        assert!(matches!(
            svc.get_batch(&missing).await,
            Err(PayrollError::BatchNotFound(_))
        ));
        assert!(matches!(
            svc.update_batch_status(&missing, BatchStatus::Executing).await,
            Err(PayrollError::BatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_batch_status_enforces_lifecycle() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();

        let err = svc
            .update_batch_status(&id, BatchStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, PayrollError::InvalidBatchTransition { .. }));
        assert_eq!(svc.get_batch(&id).await.unwrap().status, BatchStatus::Draft);

        svc.update_batch_status(&id, BatchStatus::AwaitingApproval).await.unwrap();
        svc.update_batch_status(&id, BatchStatus::Approved).await.unwrap();
        svc.update_batch_status(&id, BatchStatus::Executing).await.unwrap();
        assert_eq!(svc.get_batch(&id).await.unwrap().status, BatchStatus::Executing);
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();

        // Cannot approve a draft
        assert!(svc.approve(&id, "cfo", ApproverRole::Cfo, None).await.is_err());

        svc.submit_for_approval(&id, "admin").await.unwrap();
        svc.approve(&id, "cfo", ApproverRole::Cfo, Some("ok".to_string()))
            .await
            .unwrap();

        let batch = svc.get_batch(&id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Approved);
        assert_eq!(batch.approvals.len(), 1);
        assert_eq!(batch.approvals[0].action, ApprovalAction::Approved);
        assert_eq!(batch.events.len(), 2);
    }

    #[tokio::test]
    async fn test_decline_requires_reason_and_returns_to_draft() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();
        svc.submit_for_approval(&id, "admin").await.unwrap();

        assert!(matches!(
            svc.decline(&id, "fin", ApproverRole::FinanceApprover, "").await,
            Err(PayrollError::ValidationError(_))
        ));
        assert!(svc.get_batch(&id).await.unwrap().approvals.is_empty());

        svc.decline(&id, "fin", ApproverRole::FinanceApprover, "wrong FX")
            .await
            .unwrap();
        let batch = svc.get_batch(&id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Draft);
        assert_eq!(batch.approvals[0].action, ApprovalAction::Declined);
        assert_eq!(batch.events.last().unwrap().level, EventLevel::Warning);

        // Declining a draft is not a valid move
        assert!(svc
            .decline(&id, "fin", ApproverRole::FinanceApprover, "again")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_fx_snapshot_and_lock() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();

        assert!(svc.lock_fx(&id, "admin", 300).await.is_err());

        let snapshot = FxSnapshot::new(vec![FxQuote {
            provider: "wise".to_string(),
            pair: "USD/EUR".to_string(),
            rate: Rate::new(dec!(0.92)).unwrap(),
            fee: Money::new(dec!(3)),
        }]);
        svc.set_fx_snapshot(&id, snapshot).await.unwrap();
        svc.lock_fx(&id, "admin", 300).await.unwrap();

        let batch = svc.get_batch(&id).await.unwrap();
        let fx = batch.fx_snapshot.unwrap();
        assert_eq!(fx.locked_at, Some(svc.now()));
        assert_eq!(fx.remaining(svc.now()), Some(300));
    }

    #[tokio::test]
    async fn test_add_receipt_upserts_by_payee() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();

        svc.add_receipt(&id, receipt("a")).await.unwrap();
        let mut again = receipt("a");
        again.provider_ref = "PRV-2".to_string();
        svc.add_receipt(&id, again).await.unwrap();

        let batch = svc.get_batch(&id).await.unwrap();
        assert_eq!(batch.receipts.len(), 1);
        assert_eq!(batch.receipts[0].provider_ref, "PRV-2");
    }

    #[tokio::test]
    async fn test_add_receipt_cannot_move_status_backwards() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();
        let mut paid = receipt("a");
        paid.status = ReceiptStatus::Paid;
        paid.paid_at = Some(svc.now());
        svc.add_receipt(&id, paid).await.unwrap();

        let err = svc.add_receipt(&id, receipt("a")).await.unwrap_err();
        assert!(matches!(
            err,
            PayrollError::InvalidReceiptTransition {
                from: ReceiptStatus::Paid,
                to: ReceiptStatus::Initiated,
            }
        ));

        let batch = svc.get_batch(&id).await.unwrap();
        assert_eq!(batch.receipt_for("a").unwrap().status, ReceiptStatus::Paid);
    }

    #[tokio::test]
    async fn test_add_receipt_allows_retry_reset() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();
        let mut failed = receipt("a");
        failed.status = ReceiptStatus::Failed;
        failed.failure_reason = Some("bank error".to_string());
        svc.add_receipt(&id, failed).await.unwrap();

        svc.add_receipt(&id, receipt("a")).await.unwrap();
        let batch = svc.get_batch(&id).await.unwrap();
        assert_eq!(batch.receipt_for("a").unwrap().status, ReceiptStatus::Initiated);
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let svc = service();
        assert!(matches!(
            svc.update_batch_status(&BatchId::from("nope"), BatchStatus::Completed)
                .await,
            Err(PayrollError::BatchNotFound(_))
        ));
        assert!(svc.locks.lock().await.is_empty());

        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();
        svc.add_event(&id, AuditEvent::info("admin", "note", svc.now()))
            .await
            .unwrap();
        assert!(svc.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_receipt_merges_and_validates() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();

        assert!(matches!(
            svc.update_receipt(&id, "a", ReceiptUpdate::status(ReceiptStatus::InTransit))
                .await,
            Err(PayrollError::ReceiptNotFound { .. })
        ));

        svc.add_receipt(&id, receipt("a")).await.unwrap();
        let r = svc
            .update_receipt(&id, "a", ReceiptUpdate::status(ReceiptStatus::InTransit))
            .await
            .unwrap();
        assert_eq!(r.status, ReceiptStatus::InTransit);
        assert_eq!(r.provider_ref, "PRV-1");

        let err = svc
            .update_receipt(&id, "a", ReceiptUpdate::status(ReceiptStatus::Initiated))
            .await
            .unwrap_err();
        assert!(matches!(err, PayrollError::InvalidReceiptTransition { .. }));
    }

    #[tokio::test]
    async fn test_remove_payee_keeps_receipt() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a", "b"]), "admin").await.unwrap();
        svc.add_receipt(&id, receipt("a")).await.unwrap();

        let removed = svc.remove_payee(&id, "a").await.unwrap();
        assert_eq!(removed.worker_id, "a");

        let batch = svc.get_batch(&id).await.unwrap();
        assert!(batch.payee("a").is_none());
        assert!(batch.receipt_for("a").is_some());

        assert!(matches!(
            svc.remove_payee(&id, "a").await,
            Err(PayrollError::PayeeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_payee_status() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();
        svc.set_payee_status(&id, "a", PayeeStatus::OnHold).await.unwrap();
        assert_eq!(
            svc.get_batch(&id).await.unwrap().payee("a").unwrap().status,
            PayeeStatus::OnHold
        );
        assert!(svc.set_payee_status(&id, "zz", PayeeStatus::Paid).await.is_err());
    }

    #[tokio::test]
    async fn test_add_event_and_approval_append_in_order() {
        let svc = service();
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();
        svc.add_event(&id, AuditEvent::info("admin", "first", svc.now())).await.unwrap();
        svc.add_event(&id, AuditEvent::info("admin", "second", svc.now())).await.unwrap();
        svc.add_approval(
            &id,
            Approval {
                actor_id: "cfo".to_string(),
                role: ApproverRole::Cfo,
                action: ApprovalAction::Approved,
                comment: None,
                at: svc.now(),
            },
        )
        .await
        .unwrap();

        let batch = svc.get_batch(&id).await.unwrap();
        let messages: Vec<&str> = batch.events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["first", "second"]);
        assert_eq!(batch.approvals.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_not_lost() {
        let svc = Arc::new(service());
        let id = svc.create_batch("2026-10", payees(&["a"]), "admin").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                svc.add_event(&id, AuditEvent::info("t", format!("e{i}"), svc.now()))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(svc.get_batch(&id).await.unwrap().events.len(), 50);
    }
}
