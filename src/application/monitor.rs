use crate::domain::batch::PayrollBatch;
use crate::domain::payee::{PayrollPayee, WorkerKind};
use crate::domain::receipt::ReceiptStatus;
use serde::Serialize;
use std::collections::HashSet;

/// Receipt counts for one group of payees.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortStats {
    pub total: usize,
    /// Payees without a receipt yet.
    pub pending: usize,
    pub initiated: usize,
    pub in_transit: usize,
    pub paid: usize,
    pub failed: usize,
    pub completion_pct: f64,
}

impl CohortStats {
    fn from_payees<'a>(batch: &PayrollBatch, payees: impl Iterator<Item = &'a PayrollPayee>) -> Self {
        let mut stats = Self::default();
        for payee in payees {
            stats.total += 1;
            match batch.receipt_for(&payee.worker_id).map(|r| r.status) {
                None => stats.pending += 1,
                Some(ReceiptStatus::Initiated) => stats.initiated += 1,
                Some(ReceiptStatus::InTransit) => stats.in_transit += 1,
                Some(ReceiptStatus::Paid) => stats.paid += 1,
                Some(ReceiptStatus::Failed) => stats.failed += 1,
            }
        }
        stats.completion_pct = if stats.total == 0 {
            0.0
        } else {
            stats.paid as f64 / stats.total as f64 * 100.0
        };
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSummary {
    pub overall: CohortStats,
    pub employees: CohortStats,
    pub contractors: CohortStats,
}

/// Read-only aggregate view over a batch's execution progress.
///
/// Only current payees are counted. Receipts left behind by removed payees
/// do not show up in any cohort.
pub struct ExecutionMonitor;

impl ExecutionMonitor {
    /// Splits payees into cohorts using the given id lists. Payees in
    /// neither list only count towards `overall`.
    pub fn summarize(
        batch: &PayrollBatch,
        employee_ids: &[String],
        contractor_ids: &[String],
    ) -> MonitorSummary {
        let employees: HashSet<&str> = employee_ids.iter().map(String::as_str).collect();
        let contractors: HashSet<&str> = contractor_ids.iter().map(String::as_str).collect();

        MonitorSummary {
            overall: CohortStats::from_payees(batch, batch.payees.iter()),
            employees: CohortStats::from_payees(
                batch,
                batch
                    .payees
                    .iter()
                    .filter(|p| employees.contains(p.worker_id.as_str())),
            ),
            contractors: CohortStats::from_payees(
                batch,
                batch
                    .payees
                    .iter()
                    .filter(|p| contractors.contains(p.worker_id.as_str())),
            ),
        }
    }

    /// Cohorts taken from each payee's own [`WorkerKind`].
    pub fn summarize_by_kind(batch: &PayrollBatch) -> MonitorSummary {
        let (employees, contractors): (Vec<&PayrollPayee>, Vec<&PayrollPayee>) = batch
            .payees
            .iter()
            .partition(|p| p.kind == WorkerKind::Employee);
        let ids = |v: Vec<&PayrollPayee>| v.into_iter().map(|p| p.worker_id.clone()).collect::<Vec<_>>();
        Self::summarize(batch, &ids(employees), &ids(contractors))
    }
}
