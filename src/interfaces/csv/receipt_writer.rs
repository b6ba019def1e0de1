use crate::domain::receipt::{PaymentReceipt, ReceiptStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct ReceiptRow<'a> {
    payee_id: &'a str,
    provider_ref: &'a str,
    amount: String,
    ccy: &'a str,
    status: ReceiptStatus,
    paid_at: Option<String>,
    failure_reason: Option<&'a str>,
}

impl<'a> From<&'a PaymentReceipt> for ReceiptRow<'a> {
    fn from(r: &'a PaymentReceipt) -> Self {
        Self {
            payee_id: &r.payee_id,
            provider_ref: &r.provider_ref,
            amount: r.amount.value().normalize().to_string(),
            ccy: r.ccy.as_str(),
            status: r.status,
            paid_at: r.paid_at.map(|t| t.to_rfc3339()),
            failure_reason: r.failure_reason.as_deref(),
        }
    }
}

/// Writes payment receipts as CSV with a header row.
pub struct ReceiptWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReceiptWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_receipts<'a>(&mut self, receipts: impl IntoIterator<Item = &'a PaymentReceipt>) -> Result<()> {
        let mut wrote_any = false;
        for receipt in receipts {
            self.writer.serialize(ReceiptRow::from(receipt))?;
            wrote_any = true;
        }
        // Serializing structs emits the header lazily; keep it for empty output too.
        if !wrote_any {
            self.writer.write_record([
                "payee_id",
                "provider_ref",
                "amount",
                "ccy",
                "status",
                "paid_at",
                "failure_reason",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
