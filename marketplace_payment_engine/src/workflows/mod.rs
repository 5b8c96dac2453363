//! The four order-update workflows driven by the orchestrator's job queue (and re-driven by its timer):
//! payment creation, out-of-band payment confirmation, completion (with ledger reconciliation) and cancellation.
//!
//! Every workflow checks the order's current status before acting and goes through the coordinator for the final
//! transition, so redelivered or duplicated jobs are harmless.

mod cancel;
mod complete;
mod confirm;
mod pay;

pub use cancel::CancellationWorkflow;
pub use complete::CompletionWorkflow;
pub use confirm::ConfirmOrderPaymentWorkflow;
pub use pay::{decide, PayOrderWorkflow, PaymentDecision};
