use crate::domain::batch::{BatchId, PayrollBatch};
use crate::domain::ports::BatchStore;
use crate::error::{PayrollError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family for storing batch aggregates.
pub const CF_BATCHES: &str = "batches";

/// A persistent batch store backed by RocksDB.
///
/// Each batch is stored as one JSON document keyed by its id, so a batch and
/// its receipts, approvals and events are always written together.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_batches = ColumnFamilyDescriptor::new(CF_BATCHES, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_batches])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn batches_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(CF_BATCHES).ok_or_else(|| {
            PayrollError::IoError(std::io::Error::other("Batches column family not found"))
        })
    }
}

#[async_trait]
impl BatchStore for RocksDBStore {
    async fn store(&self, batch: PayrollBatch) -> Result<()> {
        let cf = self.batches_cf()?;
        let value = serde_json::to_vec(&batch)?;
        self.db.put_cf(cf, batch.id.as_str().as_bytes(), value)?;
        tracing::debug!(batch_id = %batch.id, "batch persisted");
        Ok(())
    }

    async fn get(&self, id: &BatchId) -> Result<Option<PayrollBatch>> {
        let cf = self.batches_cf()?;
        match self.db.get_cf(cf, id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> Result<Vec<PayrollBatch>> {
        let cf = self.batches_cf()?;
        let mut batches = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let batch: PayrollBatch = serde_json::from_slice(&value)?;
            batches.push(batch);
        }
        batches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(batches)
    }

    async fn exists(&self, id: &BatchId) -> Result<bool> {
        let cf = self.batches_cf()?;
        // Just check if the key exists without retrieving the value
        Ok(self.db.get_pinned_cf(cf, id.as_str().as_bytes())?.is_some())
    }
}
