//! Adapters for the domain ports: batch storage, clocks and outcome policies.

pub mod clock;
pub mod in_memory;
pub mod outcome;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
