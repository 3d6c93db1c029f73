use std::sync::Arc;

use axum::{
    Extension, Json,
    response::{IntoResponse, Response},
};

use storecore_checkout::CheckoutRequest;

use crate::app::dto::{CheckoutRequestBody, ok_body, order_json};
use crate::app::errors::service_error_to_response;
use crate::app::services::AppServices;
use crate::context::ShopperContext;

/// Freeze the shopper's cart into an order. Reservations become commitments;
/// the ledger is untouched.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Json(body): Json<CheckoutRequestBody>,
) -> Response {
    let request = CheckoutRequest {
        shipping_address: body.shipping_address.into(),
        payment_method: body.payment_method,
        notes: body.notes,
    };

    match services.orders.create_order(ctx.shopper_id(), request) {
        Ok(order) => Json(ok_body(order_json(&order))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
