//! The order state machine, expressed as data.
//!
//! The table below is the single source of truth for which actions are legal in which status. Keeping it as a flat
//! list of `(status, action, next)` triples makes the machine testable in isolation and trivially serializable for
//! audits. Anything not in the table is an invalid transition.
//!
//! | Status               | Action → Next                                                                  |
//! |----------------------|--------------------------------------------------------------------------------|
//! | PaymentProcessing    | ConfirmPayment→ApprovalPending, QuasiConfirmPayment→PaymentRequireAction,      |
//! |                      | FailPayment→PaymentFailed, Cancel→Canceling                                    |
//! | PaymentFailed        | ProcessPayment→PaymentProcessing, Cancel→Canceling                             |
//! | PaymentRequireAction | ProcessPayment→PaymentProcessing, ConfirmPayment→ApprovalPending, Cancel→Canceling |
//! | ApprovalPending      | Approve→Processing, Cancel→Canceling                                           |
//! | Processing           | Delivery→DeliveryPending, Cancel→Canceling                                     |
//! | DeliveryPending      | Complete→Completing, Cancel→Canceling                                          |
//! | Completing           | MarkAsCompleted→Completed                                                      |
//! | Canceling            | MarkAsCanceled→Canceled                                                        |
//! | Completed, Canceled  | terminal                                                                       |

use crate::db_types::{OrderAction, OrderStatus};

use OrderAction::*;
use OrderStatus::*;

pub const TRANSITIONS: &[(OrderStatus, OrderAction, OrderStatus)] = &[
    (PaymentProcessing, ConfirmPayment, ApprovalPending),
    (PaymentProcessing, QuasiConfirmPayment, PaymentRequireAction),
    (PaymentProcessing, FailPayment, PaymentFailed),
    (PaymentProcessing, Cancel, Canceling),
    (PaymentFailed, ProcessPayment, PaymentProcessing),
    (PaymentFailed, Cancel, Canceling),
    (PaymentRequireAction, ProcessPayment, PaymentProcessing),
    (PaymentRequireAction, ConfirmPayment, ApprovalPending),
    (PaymentRequireAction, Cancel, Canceling),
    (ApprovalPending, Approve, Processing),
    (ApprovalPending, Cancel, Canceling),
    (Processing, Delivery, DeliveryPending),
    (Processing, Cancel, Canceling),
    (DeliveryPending, Complete, Completing),
    (DeliveryPending, Cancel, Canceling),
    (Completing, MarkAsCompleted, Completed),
    (Canceling, MarkAsCanceled, Canceled),
];

/// Computes the status an order moves to when `action` is applied in `status`, or `None` when the pair is not a
/// legal transition. Pure; persisting the result is the coordinator's job.
pub fn reduce(status: OrderStatus, action: OrderAction) -> Option<OrderStatus> {
    TRANSITIONS.iter().find(|(from, a, _)| *from == status && *a == action).map(|(_, _, next)| *next)
}
