//! Orchard storefront library.
//!
//! The storefront API server as a library: catalog reads, session carts,
//! atomic stock, checkout via Stripe, and webhook-driven order
//! finalization. The binary in `main.rs` wires this up; tests use it
//! directly with the in-memory backends.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod kv;
pub mod routes;
pub mod services;
pub mod state;
pub mod tax;
