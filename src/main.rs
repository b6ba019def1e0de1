use chrono::Utc;
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use payroll_sim::application::batches::BatchService;
use payroll_sim::application::executor::ExecutionSimulator;
use payroll_sim::application::monitor::ExecutionMonitor;
use payroll_sim::config::ExecutionConfig;
use payroll_sim::domain::batch::ApproverRole;
use payroll_sim::domain::payee::PayrollPayee;
use payroll_sim::domain::ports::BatchStoreBox;
use payroll_sim::domain::receipt::ReceiptStatus;
use payroll_sim::infrastructure::clock::SystemClock;
use payroll_sim::infrastructure::in_memory::InMemoryBatchStore;
use payroll_sim::infrastructure::outcome::RandomOutcome;
#[cfg(feature = "storage-rocksdb")]
use payroll_sim::infrastructure::rocksdb::RocksDBStore;
use payroll_sim::interfaces::csv::payee_reader::PayeeReader;
use payroll_sim::interfaces::csv::receipt_writer::ReceiptWriter;
use serde_json::json;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Output {
    /// Receipts as CSV
    Receipts,
    /// Execution monitor summary as JSON
    Summary,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input payees CSV file
    #[arg(required_unless_present = "list_batches")]
    input: Option<PathBuf>,

    /// Payroll period label (defaults to the current month)
    #[arg(long)]
    period: Option<String>,

    /// Actor recorded as creator and executor of the batch
    #[arg(long, default_value = "payroll-admin")]
    actor: String,

    /// Route the batch through approval, approved by this actor
    #[arg(long)]
    approver: Option<String>,

    /// JSON file with execution timing and outcome settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Probability that a payment settles (overrides the config file)
    #[arg(long)]
    success_rate: Option<f64>,

    /// Delay between consecutive payees in milliseconds (overrides the config file)
    #[arg(long)]
    stagger_ms: Option<u64>,

    /// Seed for the outcome generator, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Retry every failed payment once execution has finished
    #[arg(long)]
    retry_failed: bool,

    /// What to print on stdout
    #[arg(long, value_enum, default_value_t = Output::Receipts)]
    output: Output,

    /// Print the batches held in the store and exit
    #[arg(long)]
    list_batches: bool,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn open_store(db_path: Option<PathBuf>) -> Result<BatchStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryBatchStore::new()))
        }
        None => Ok(Box::new(InMemoryBatchStore::new())),
    }
}

fn load_config(cli: &Cli) -> Result<ExecutionConfig> {
    let mut config = match &cli.config {
        Some(path) => ExecutionConfig::load(path).into_diagnostic()?,
        None => ExecutionConfig::default(),
    };
    if let Some(rate) = cli.success_rate {
        config.success_rate = rate;
    }
    if let Some(stagger) = cli.stagger_ms {
        config.stagger_ms = stagger;
    }
    config.validate().into_diagnostic()?;
    Ok(config)
}

fn read_payees(path: &Path) -> Result<Vec<PayrollPayee>> {
    let file = File::open(path).into_diagnostic()?;
    let mut payees = Vec::new();
    for payee in PayeeReader::new(file).payees() {
        match payee {
            Ok(p) => payees.push(p),
            Err(e) => tracing::warn!(error = %e, "Skipping invalid payee row"),
        }
    }
    Ok(payees)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let store = open_store(cli.db_path.clone())?;
    let batches = Arc::new(BatchService::new(store, Arc::new(SystemClock)));

    if cli.list_batches {
        let mut out = csv::Writer::from_writer(io::stdout().lock());
        out.write_record(["id", "period", "status", "payees", "receipts"])
            .into_diagnostic()?;
        for batch in batches.list_batches().await.into_diagnostic()? {
            out.write_record([
                batch.id.to_string(),
                batch.period.clone(),
                format!("{:?}", batch.status),
                batch.payees.len().to_string(),
                batch.receipts.len().to_string(),
            ])
            .into_diagnostic()?;
        }
        out.flush().into_diagnostic()?;
        return Ok(());
    }

    let outcome = match cli.seed {
        Some(seed) => RandomOutcome::seeded(config.success_rate, &config.failure_reason, seed),
        None => RandomOutcome::new(config.success_rate, &config.failure_reason),
    }
    .into_diagnostic()?;
    let simulator = ExecutionSimulator::new(Arc::clone(&batches), Arc::new(outcome), config);

    let input = cli
        .input
        .as_ref()
        .ok_or_else(|| miette::miette!("an input payees CSV file is required"))?;
    let payees = read_payees(input)?;
    let period = cli
        .period
        .clone()
        .unwrap_or_else(|| Utc::now().format("%Y-%m").to_string());
    let batch_id = batches
        .create_batch(&period, payees, &cli.actor)
        .await
        .into_diagnostic()?;

    if let Some(approver) = &cli.approver {
        batches
            .submit_for_approval(&batch_id, &cli.actor)
            .await
            .into_diagnostic()?;
        batches
            .approve(&batch_id, approver, ApproverRole::FinanceApprover, None)
            .await
            .into_diagnostic()?;
    }

    simulator
        .execute(&batch_id, &cli.actor)
        .await
        .into_diagnostic()?
        .wait()
        .await
        .into_diagnostic()?;

    if cli.retry_failed {
        let batch = batches.get_batch(&batch_id).await.into_diagnostic()?;
        let failed: Vec<String> = batch
            .receipts
            .iter()
            .filter(|r| r.status == ReceiptStatus::Failed)
            .map(|r| r.payee_id.clone())
            .collect();
        let mut handles = Vec::with_capacity(failed.len());
        for payee_id in &failed {
            handles.push(
                simulator
                    .retry(&batch_id, payee_id, &cli.actor)
                    .await
                    .into_diagnostic()?,
            );
        }
        for handle in handles {
            handle.await.into_diagnostic()?.into_diagnostic()?;
        }
        simulator.finalize(&batch_id).await.into_diagnostic()?;
    }

    let batch = batches.get_batch(&batch_id).await.into_diagnostic()?;
    let summary = ExecutionMonitor::summarize_by_kind(&batch);
    tracing::info!(
        batch_id = %batch.id,
        status = ?batch.status,
        paid = summary.overall.paid,
        failed = summary.overall.failed,
        completion_pct = summary.overall.completion_pct,
        "execution finished"
    );

    let stdout = io::stdout();
    match cli.output {
        Output::Receipts => {
            let mut writer = ReceiptWriter::new(stdout.lock());
            writer.write_receipts(&batch.receipts).into_diagnostic()?;
        }
        Output::Summary => {
            let report = json!({
                "batch_id": batch.id,
                "period": batch.period,
                "status": batch.status,
                "summary": summary,
            });
            let mut out = stdout.lock();
            serde_json::to_writer_pretty(&mut out, &report).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
        }
    }

    Ok(())
}
