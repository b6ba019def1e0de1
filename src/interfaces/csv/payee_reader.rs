use crate::domain::money::{CurrencyCode, Money, Rate};
use crate::domain::payee::{PayeeStatus, PayrollPayee, WorkerKind};
use crate::error::{PayrollError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a payee CSV file, before validation.
#[derive(Debug, Deserialize)]
struct PayeeRecord {
    worker_id: String,
    name: String,
    #[serde(default)]
    country: String,
    currency: String,
    gross: Decimal,
    employer_costs: Option<Decimal>,
    fx_fee: Option<Decimal>,
    fx_rate: Option<Decimal>,
    eta: Option<String>,
    kind: Option<WorkerKind>,
}

impl TryFrom<PayeeRecord> for PayrollPayee {
    type Error = PayrollError;

    fn try_from(rec: PayeeRecord) -> Result<Self> {
        if rec.worker_id.is_empty() {
            return Err(PayrollError::ValidationError(
                "worker_id must not be empty".to_string(),
            ));
        }
        if rec.gross < Decimal::ZERO {
            return Err(PayrollError::ValidationError(format!(
                "Gross amount for {} must not be negative",
                rec.worker_id
            )));
        }
        Ok(Self {
            currency: CurrencyCode::new(&rec.currency)?,
            gross: Money::new(rec.gross),
            employer_costs: Money::new(rec.employer_costs.unwrap_or_default()),
            fx_fee: Money::new(rec.fx_fee.unwrap_or_default()),
            proposed_fx_rate: rec.fx_rate.map(Rate::new).transpose()?,
            eta: rec.eta.filter(|s| !s.is_empty()),
            adjustments: Vec::new(),
            kind: rec.kind.unwrap_or_default(),
            status: PayeeStatus::Pending,
            worker_id: rec.worker_id,
            name: rec.name,
            country: rec.country,
        })
    }
}

/// Reads payees from a CSV source.
///
/// Expected header:
/// `worker_id,name,country,currency,gross,employer_costs,fx_fee,fx_rate,eta,kind`.
/// Only `worker_id`, `name`, `currency` and `gross` are required; whitespace
/// around fields is trimmed.
pub struct PayeeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PayeeReader<R> {
    /// Creates a new `PayeeReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads, deserializes and validates payees.
    pub fn payees(self) -> impl Iterator<Item = Result<PayrollPayee>> {
        self.reader.into_deserialize().map(|result| {
            let record: PayeeRecord = result.map_err(PayrollError::from)?;
            PayrollPayee::try_from(record)
        })
    }
}
