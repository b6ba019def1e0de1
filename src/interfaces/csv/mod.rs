pub mod payee_reader;
pub mod receipt_writer;
