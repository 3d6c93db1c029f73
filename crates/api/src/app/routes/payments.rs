use std::sync::Arc;

use axum::{
    Extension, Json,
    response::{IntoResponse, Response},
};

use crate::app::dto::{PaymentWebhookRequest, order_json};
use crate::app::errors::service_error_to_response;
use crate::app::services::AppServices;

/// Payment provider callback. A failed outcome cancels the order while it is
/// still cancellable, returning its stock.
pub async fn webhook(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<PaymentWebhookRequest>,
) -> Response {
    let order_id = match super::common::parse_order_id(&body.order_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.orders.record_payment(order_id, body.outcome) {
        Ok(order) => Json(order_json(&order)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
