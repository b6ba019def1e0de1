//! Application layer orchestrating payroll batch execution.
//!
//! `BatchService` owns batch state and serializes mutations per batch;
//! `ExecutionSimulator` schedules payee payments as tokio tasks on top of it;
//! `ExecutionMonitor` turns a batch into aggregate counts for display.

pub mod batches;
pub mod executor;
pub mod monitor;
