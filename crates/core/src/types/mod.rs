//! Core types for Orchard.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{cents_to_decimal, decimal_to_cents};
pub use status::{OrderStatus, StatusTransitionError};
