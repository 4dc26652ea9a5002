//! Application error type and HTTP mapping.
//!
//! Module-level errors (`KvError`, `StockError`, `StripeError`, `OrderError`,
//! `CheckoutError`) convert into [`AppError`], which renders a JSON body with
//! the right status code. Internal detail stays in the logs; clients see a
//! stable, generic message for server-class failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::checkout::CheckoutError;
use crate::db::orders::OrderError;
use crate::inventory::StockError;
use crate::kv::KvError;
use crate::services::stripe::StripeError;

/// Convenience alias for handler results.
pub type Result<T> = std::result::Result<T, AppError>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or unacceptable request input.
    #[error("{0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Requested quantity exceeds available stock.
    #[error("Not enough stock for {product}")]
    InsufficientStock {
        /// Offending product (title or id, whichever the caller has).
        product: String,
    },

    /// Webhook signature verification failed.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Missing or wrong admin credentials.
    #[error("Unauthorized")]
    Unauthorized,

    /// The request conflicts with current state (e.g. backward status move).
    #[error("{0}")]
    Conflict(String),

    /// A dependency (KV, payment provider) failed.
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InsufficientStock { .. } | Self::InvalidSignature => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show clients. Server-class errors keep their detail
    /// out of the response body.
    fn public_message(&self) -> String {
        match self {
            Self::Upstream(_) => "Upstream service error".to_owned(),
            Self::Internal(_) => "Internal server error".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, status = %status, "request failed");
            sentry::capture_message(&self.to_string(), sentry::Level::Error);
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<StockError> for AppError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::Insufficient { product_id } => Self::InsufficientStock {
                product: product_id.into_inner(),
            },
            StockError::Kv(e) => Self::Upstream(e.to_string()),
        }
    }
}

impl From<StripeError> for AppError {
    fn from(e: StripeError) -> Self {
        match e {
            StripeError::InvalidSignature(reason) => {
                tracing::warn!(reason = %reason, "webhook signature rejected");
                Self::InvalidSignature
            }
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound(what) => Self::NotFound(format!("order {what}")),
            OrderError::InvalidTransition(err) => Self::Conflict(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::EmptyCart => Self::Validation("Cart is empty".to_owned()),
            CheckoutError::ProductNotFound(id) => Self::NotFound(format!("product {id}")),
            CheckoutError::InsufficientStock { title } => {
                Self::InsufficientStock { product: title }
            }
            CheckoutError::Kv(e) => Self::Upstream(e.to_string()),
            CheckoutError::Stripe(e) => e.into(),
        }
    }
}
