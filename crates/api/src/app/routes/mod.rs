use axum::{
    Router,
    routing::{get, post},
};

pub mod admin;
pub mod cart;
pub mod checkout;
mod common;
pub mod orders;
pub mod payments;
pub mod system;
pub mod units;

/// All authenticated routes. `/health` lives outside this router.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route(
            "/cart",
            get(cart::view)
                .post(cart::add_item)
                .put(cart::update_item)
                .delete(cart::remove_item),
        )
        .route("/cart/clear", post(cart::clear))
        .route("/checkout", post(checkout::checkout))
        .route("/orders", get(orders::list))
        .route("/orders/:id", get(orders::get))
        .route("/orders/:id/cancel", post(orders::cancel))
        .route("/payments/webhook", post(payments::webhook))
        .route("/units", get(units::list))
        .route("/units/:id", get(units::get))
        .nest("/admin", admin::router())
}
