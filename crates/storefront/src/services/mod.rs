//! Outbound integrations and the order finalization saga.

pub mod email;
pub mod finalize;
pub mod recovery;
pub mod stripe;
