use super::fx::FxSnapshot;
use super::money::Money;
use super::payee::PayrollPayee;
use super::receipt::{PaymentReceipt, ReceiptStatus};
use crate::error::PayrollError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn generate() -> Self {
        Self(format!("batch-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
pub enum BatchStatus {
    Draft,
    AwaitingApproval,
    Approved,
    Executing,
    Completed,
}

impl BatchStatus {
    /// Transition table for batch lifecycle. Re-setting the current status is
    /// always allowed and treated as a no-op.
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        self == next
            || matches!(
                (self, next),
                (Draft, AwaitingApproval)
                    | (Draft, Executing)
                    | (AwaitingApproval, Approved)
                    | (AwaitingApproval, Draft)
                    | (Approved, Executing)
                    | (Executing, Completed)
            )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    PayrollAdmin,
    FinanceApprover,
    Cfo,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum ApprovalAction {
    Approved,
    Declined,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Approval {
    pub actor_id: String,
    pub role: ApproverRole,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

/// An entry in a batch's audit trail.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AuditEvent {
    pub actor: String,
    pub message: String,
    pub level: EventLevel,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn info(actor: &str, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(actor, message, EventLevel::Info, at)
    }

    pub fn new(actor: &str, message: impl Into<String>, level: EventLevel, at: DateTime<Utc>) -> Self {
        Self {
            actor: actor.to_string(),
            message: message.into(),
            level,
            at,
        }
    }
}

/// A collection of payroll payments grouped for one processing cycle.
///
/// Holds at most one receipt per payee. Receipts are keyed by `payee_id` and
/// replaced in place, never appended twice.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayrollBatch {
    pub id: BatchId,
    pub period: String,
    pub status: BatchStatus,
    pub payees: Vec<PayrollPayee>,
    pub receipts: Vec<PaymentReceipt>,
    pub fx_snapshot: Option<FxSnapshot>,
    pub approvals: Vec<Approval>,
    pub events: Vec<AuditEvent>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl PayrollBatch {
    pub fn new(
        id: BatchId,
        period: &str,
        payees: Vec<PayrollPayee>,
        created_by: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            period: period.to_string(),
            status: BatchStatus::Draft,
            payees,
            receipts: Vec::new(),
            fx_snapshot: None,
            approvals: Vec::new(),
            events: Vec::new(),
            created_by: created_by.to_string(),
            created_at,
        }
    }

    pub fn transition_to(&mut self, next: BatchStatus) -> Result<(), PayrollError> {
        if !self.status.can_transition_to(next) {
            return Err(PayrollError::InvalidBatchTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn payee(&self, payee_id: &str) -> Option<&PayrollPayee> {
        self.payees.iter().find(|p| p.worker_id == payee_id)
    }

    pub fn payee_mut(&mut self, payee_id: &str) -> Option<&mut PayrollPayee> {
        self.payees.iter_mut().find(|p| p.worker_id == payee_id)
    }

    pub fn receipt_for(&self, payee_id: &str) -> Option<&PaymentReceipt> {
        self.receipts.iter().find(|r| r.payee_id == payee_id)
    }

    pub fn receipt_for_mut(&mut self, payee_id: &str) -> Option<&mut PaymentReceipt> {
        self.receipts.iter_mut().find(|r| r.payee_id == payee_id)
    }

    /// Inserts `receipt`, replacing any receipt already held for the same payee.
    pub fn upsert_receipt(&mut self, receipt: PaymentReceipt) {
        match self
            .receipts
            .iter()
            .position(|r| r.payee_id == receipt.payee_id)
        {
            Some(idx) => self.receipts[idx] = receipt,
            None => self.receipts.push(receipt),
        }
    }

    /// Like [`upsert_receipt`](Self::upsert_receipt), but a receipt already
    /// held for the payee may only be replaced by one its status can move to.
    pub fn record_receipt(&mut self, receipt: PaymentReceipt) -> Result<(), PayrollError> {
        if let Some(existing) = self.receipt_for(&receipt.payee_id)
            && !existing.status.can_transition_to(receipt.status)
        {
            return Err(PayrollError::InvalidReceiptTransition {
                from: existing.status,
                to: receipt.status,
            });
        }
        self.upsert_receipt(receipt);
        Ok(())
    }

    /// True when every payee holds a `Paid` receipt. Vacuously true for a
    /// batch without payees.
    pub fn all_paid(&self) -> bool {
        self.payees.iter().all(|p| {
            self.receipt_for(&p.worker_id)
                .is_some_and(|r| r.status == ReceiptStatus::Paid)
        })
    }

    pub fn total_cost(&self) -> Money {
        self.payees.iter().map(PayrollPayee::total_cost).sum()
    }
}
