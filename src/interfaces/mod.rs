//! External data formats for payees and receipts.

pub mod csv;
