use super::money::{CurrencyCode, Money};
use crate::error::PayrollError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ReceiptStatus {
    Initiated,
    InTransit,
    Paid,
    Failed,
}

impl ReceiptStatus {
    /// Receipts only move forward. The single way back is a retry,
    /// which resets `Failed` to `Initiated`.
    pub fn can_transition_to(self, next: ReceiptStatus) -> bool {
        use ReceiptStatus::*;
        self == next
            || matches!(
                (self, next),
                (Initiated, InTransit) | (InTransit, Paid) | (InTransit, Failed) | (Failed, Initiated)
            )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReceiptStatus::Paid | ReceiptStatus::Failed)
    }
}

/// The record of one payment attempt for one payee.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentReceipt {
    pub payee_id: String,
    pub provider_ref: String,
    pub amount: Money,
    pub ccy: CurrencyCode,
    pub status: ReceiptStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl PaymentReceipt {
    pub fn initiated(payee_id: &str, provider_ref: String, amount: Money, ccy: CurrencyCode) -> Self {
        Self {
            payee_id: payee_id.to_string(),
            provider_ref,
            amount,
            ccy,
            status: ReceiptStatus::Initiated,
            paid_at: None,
            failure_reason: None,
        }
    }

    /// Merges `update` into the receipt, rejecting status regressions.
    pub fn apply(&mut self, update: ReceiptUpdate) -> Result<(), PayrollError> {
        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(PayrollError::InvalidReceiptTransition {
                    from: self.status,
                    to: next,
                });
            }
            self.status = next;
        }
        if update.paid_at.is_some() {
            self.paid_at = update.paid_at;
        }
        if update.clear_failure {
            self.failure_reason = None;
        }
        if update.failure_reason.is_some() {
            self.failure_reason = update.failure_reason;
        }
        Ok(())
    }
}

/// A partial change to a receipt. Unset fields leave the receipt untouched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReceiptUpdate {
    pub status: Option<ReceiptStatus>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub clear_failure: bool,
}

impl ReceiptUpdate {
    pub fn status(status: ReceiptStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn paid(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(ReceiptStatus::Paid),
            paid_at: Some(at),
            ..Self::default()
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            status: Some(ReceiptStatus::Failed),
            failure_reason: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Back to `Initiated` for a retry, dropping the previous failure reason.
    pub fn reset() -> Self {
        Self {
            status: Some(ReceiptStatus::Initiated),
            clear_failure: true,
            ..Self::default()
        }
    }
}
