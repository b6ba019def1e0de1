use crate::domain::batch::BatchStatus;
use crate::domain::receipt::ReceiptStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayrollError {
    #[error("Batch not found: {0}")]
    BatchNotFound(String),
    #[error("Payee {payee_id} not found in batch {batch_id}")]
    PayeeNotFound { batch_id: String, payee_id: String },
    #[error("No receipt for payee {payee_id} in batch {batch_id}")]
    ReceiptNotFound { batch_id: String, payee_id: String },
    #[error("Invalid batch transition: {from:?} -> {to:?}")]
    InvalidBatchTransition { from: BatchStatus, to: BatchStatus },
    #[error("Invalid receipt transition: {from:?} -> {to:?}")]
    InvalidReceiptTransition {
        from: ReceiptStatus,
        to: ReceiptStatus,
    },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Task error: {0}")]
    TaskError(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] rocksdb::Error),
}

impl From<tokio::task::JoinError> for PayrollError {
    fn from(err: tokio::task::JoinError) -> Self {
        PayrollError::TaskError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PayrollError>;
