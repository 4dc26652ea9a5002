//! Order status with monotonic forward transitions.

use serde::{Deserialize, Serialize};

/// Error returned when an order status transition is not allowed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid order status transition: {from} -> {to}")]
pub struct StatusTransitionError {
    /// Current status.
    pub from: OrderStatus,
    /// Rejected target status.
    pub to: OrderStatus,
}

/// Lifecycle status of an order.
///
/// Transitions move forward only: `pending -> paid -> shipped -> delivered`.
/// `cancelled` and `refunded` are terminal escape hatches reachable from any
/// non-terminal state; there is no defined backward transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Whether no further transitions are allowed from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// Whether moving from `self` to `to` is an allowed forward transition.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::Paid)
            | (Self::Paid, Self::Shipped)
            | (Self::Shipped, Self::Delivered) => true,
            // Cancellation/refund from any non-terminal state
            (from, Self::Cancelled | Self::Refunded) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Validate a transition, returning the target status on success.
    ///
    /// # Errors
    ///
    /// Returns [`StatusTransitionError`] when the move is not allowed.
    pub const fn transition(self, to: Self) -> Result<Self, StatusTransitionError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(StatusTransitionError { from: self, to })
        }
    }

    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}
