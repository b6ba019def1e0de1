use crate::domain::batch::{BatchId, PayrollBatch};
use crate::domain::ports::BatchStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for payroll batches.
///
/// Uses `Arc<RwLock<HashMap<BatchId, PayrollBatch>>>` to allow shared concurrent access.
/// Contents are lost when the process exits.
#[derive(Default, Clone)]
pub struct InMemoryBatchStore {
    batches: Arc<RwLock<HashMap<BatchId, PayrollBatch>>>,
}

impl InMemoryBatchStore {
    /// Creates a new, empty in-memory batch store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn store(&self, batch: PayrollBatch) -> Result<()> {
        let mut batches = self.batches.write().await;
        batches.insert(batch.id.clone(), batch);
        Ok(())
    }

    async fn get(&self, id: &BatchId) -> Result<Option<PayrollBatch>> {
        let batches = self.batches.read().await;
        Ok(batches.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<PayrollBatch>> {
        let batches = self.batches.read().await;
        let mut all: Vec<PayrollBatch> = batches.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn exists(&self, id: &BatchId) -> Result<bool> {
        let batches = self.batches.read().await;
        Ok(batches.contains_key(id))
    }
}
