//! Order status transition rules.
//!
//! ```text
//! Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered ──► Completed
//!    │            ▲
//!    └─► Paid ────┘            (any non-terminal) ──► Cancelled
//! ```
//!
//! `Paid` is only entered through payment confirmation, never by staff.

use common::OrderStatus;

/// Position in the staff fulfillment chain. `Paid` sits level with `Pending`
/// so that both step forward into `Confirmed`.
fn rank(status: OrderStatus) -> Option<u8> {
    match status {
        OrderStatus::Pending | OrderStatus::Paid => Some(0),
        OrderStatus::Confirmed => Some(1),
        OrderStatus::Processing => Some(2),
        OrderStatus::Shipped => Some(3),
        OrderStatus::Delivered => Some(4),
        OrderStatus::Completed => Some(5),
        OrderStatus::Cancelled => None,
    }
}

/// Returns true if staff may move an order from `from` to `to`.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    if from == to {
        return true;
    }

    if to == OrderStatus::Cancelled {
        return !from.is_terminal();
    }

    if to == OrderStatus::Paid {
        return false;
    }

    match (rank(from), rank(to)) {
        (Some(from), Some(to)) => to == from + 1,
        _ => false,
    }
}
