//! HTTP route handlers.
//!
//! # Route Table
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/api/products` | [`products::index`] |
//! | GET | `/api/products/{*slug}` | [`products::show`] |
//! | GET | `/api/cart` | [`cart::show`] |
//! | POST | `/api/cart` | [`cart::add`] |
//! | PUT | `/api/cart` | [`cart::update`] |
//! | DELETE | `/api/cart` | [`cart::remove`] |
//! | POST | `/api/checkout` | [`checkout::create`] |
//! | POST | `/api/webhook/stripe` | [`webhook::stripe`] |
//! | GET | `/api/admin/inventory` | [`admin::get_inventory`] |
//! | POST | `/api/admin/inventory` | [`admin::set_inventory`] |
//! | GET | `/api/admin/reconciliation` | [`admin::reconciliation`] |
//! | POST | `/api/admin/abandoned-carts` | [`admin::abandoned_carts`] |
//!
//! Admin routes require the `x-admin-key` header.

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod products;
pub mod webhook;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// Build the API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/products", product_routes())
        .nest("/api/cart", cart_routes())
        .route("/api/checkout", post(checkout::create))
        .route("/api/webhook/stripe", post(webhook::stripe))
        .nest("/api/admin", admin_routes())
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{*slug}", get(products::show))
}

fn cart_routes() -> Router<AppState> {
    Router::new().route(
        "/",
        get(cart::show)
            .post(cart::add)
            .put(cart::update)
            .delete(cart::remove),
    )
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/inventory",
            get(admin::get_inventory).post(admin::set_inventory),
        )
        .route("/reconciliation", get(admin::reconciliation))
        .route("/abandoned-carts", post(admin::abandoned_carts))
}
