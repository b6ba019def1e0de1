use super::money::{CurrencyCode, Money, Rate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayeeStatus {
    #[default]
    Pending,
    Executing,
    Paid,
    OnHold,
}

/// How a worker is engaged. Drives the cohort split in the execution monitor.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    #[default]
    Employee,
    Contractor,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Adjustment {
    pub label: String,
    pub amount: Money,
}

/// A worker entitled to a payment within a batch.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayrollPayee {
    pub worker_id: String,
    pub name: String,
    pub country: String,
    pub currency: CurrencyCode,
    pub gross: Money,
    pub employer_costs: Money,
    pub fx_fee: Money,
    pub proposed_fx_rate: Option<Rate>,
    pub eta: Option<String>,
    #[serde(default)]
    pub adjustments: Vec<Adjustment>,
    #[serde(default)]
    pub kind: WorkerKind,
    #[serde(default)]
    pub status: PayeeStatus,
}

impl PayrollPayee {
    pub fn new(worker_id: &str, name: &str, currency: CurrencyCode, gross: Money) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            name: name.to_string(),
            country: String::new(),
            currency,
            gross,
            employer_costs: Money::ZERO,
            fx_fee: Money::ZERO,
            proposed_fx_rate: None,
            eta: None,
            adjustments: Vec::new(),
            kind: WorkerKind::Employee,
            status: PayeeStatus::Pending,
        }
    }

    pub fn with_kind(mut self, kind: WorkerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_adjustment(mut self, label: &str, amount: Money) -> Self {
        self.adjustments.push(Adjustment {
            label: label.to_string(),
            amount,
        });
        self
    }

    /// Amount actually paid out to the worker: gross plus all adjustments.
    pub fn net_amount(&self) -> Money {
        self.gross + self.adjustments.iter().map(|a| a.amount).sum::<Money>()
    }

    /// What the batch costs the employer for this payee.
    pub fn total_cost(&self) -> Money {
        self.net_amount() + self.employer_costs + self.fx_fee
    }
}
