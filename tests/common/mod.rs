#![allow(dead_code)]

use payroll_sim::application::batches::BatchService;
use payroll_sim::application::executor::ExecutionSimulator;
use payroll_sim::config::ExecutionConfig;
use payroll_sim::domain::batch::BatchId;
use payroll_sim::domain::money::{CurrencyCode, Money};
use payroll_sim::domain::payee::PayrollPayee;
use payroll_sim::domain::ports::PaymentOutcome;
use payroll_sim::infrastructure::clock::SystemClock;
use payroll_sim::infrastructure::in_memory::InMemoryBatchStore;
use rust_decimal_macros::dec;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const FAST_CONFIG: &str = "tests/fixtures/fast.json";
pub const PAYEES_CSV: &str = "tests/fixtures/payees.csv";

pub fn simulator(outcome: impl PaymentOutcome + 'static) -> ExecutionSimulator {
    let batches = Arc::new(BatchService::new(
        Box::new(InMemoryBatchStore::new()),
        Arc::new(SystemClock),
    ));
    ExecutionSimulator::new(batches, Arc::new(outcome), ExecutionConfig::default())
}

pub fn payee(id: &str) -> PayrollPayee {
    PayrollPayee::new(
        id,
        "Worker",
        CurrencyCode::new("EUR").unwrap(),
        Money::new(dec!(2500)),
    )
}

pub async fn create_batch(sim: &ExecutionSimulator, ids: &[&str]) -> BatchId {
    sim.batches()
        .create_batch("2026-10", ids.iter().map(|id| payee(id)).collect(), "admin")
        .await
        .unwrap()
}

/// Writes a payees CSV with the given data rows under the standard header.
pub fn payees_csv(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "worker_id,name,country,currency,gross,employer_costs,fx_fee,fx_rate,eta,kind"
    )
    .unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

pub fn fast_config(path: &Path, success_rate: f64) {
    let raw = std::fs::read_to_string(FAST_CONFIG).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    value["success_rate"] = serde_json::json!(success_rate);
    std::fs::write(path, value.to_string()).unwrap();
}
