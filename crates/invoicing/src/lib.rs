//! Invoicing domain module (event-sourced).
//!
//! Business rules for the invoice derived from a committed order: copied line
//! snapshots, reconciled totals, payment recording and the invoice status
//! lifecycle. Implemented purely as deterministic domain logic (no IO, no
//! storage); numbering counters live behind the `InvoiceSequence` port.

pub mod index;
pub mod invoice;
pub mod number;

pub use index::{Claim, InvoiceIndex};
pub use invoice::{
    ChangeInvoiceStatus, DeleteInvoice, GenerateInvoice, Invoice, InvoiceCommand, InvoiceDeleted,
    InvoiceEvent, InvoiceGenerated, InvoiceId, InvoiceLine, InvoiceStatus, InvoiceStatusChanged,
    InvoiceTotals, PaymentRecorded, RecordPayment, TaxEntry,
};
pub use number::{InvoiceNumberFormat, InvoiceSequence};
