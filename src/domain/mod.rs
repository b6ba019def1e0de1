//! Domain layer: payroll batches, payees, receipts and the ports the
//! application layer depends on.

pub mod batch;
pub mod fx;
pub mod money;
pub mod payee;
pub mod ports;
pub mod receipt;
