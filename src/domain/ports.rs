use super::batch::{BatchId, PayrollBatch};
use super::payee::PayrollPayee;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence for whole batch aggregates.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn store(&self, batch: PayrollBatch) -> Result<()>;
    async fn get(&self, id: &BatchId) -> Result<Option<PayrollBatch>>;
    async fn get_all(&self) -> Result<Vec<PayrollBatch>>;
    async fn exists(&self, id: &BatchId) -> Result<bool>;
}

pub type BatchStoreBox = Box<dyn BatchStore>;

/// Result of asking a provider to settle one payee's payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
}

/// Decides whether a payee's payment settles.
pub trait PaymentOutcome: Send + Sync {
    fn resolve(&self, payee: &PayrollPayee) -> Outcome;
}

/// Source of wall-clock timestamps for receipts, approvals and audit events.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
