use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::Path,
    response::{IntoResponse, Response},
};

use crate::app::dto::{ok_body, order_json, order_read_model_json};
use crate::app::errors::service_error_to_response;
use crate::app::services::AppServices;
use crate::context::ShopperContext;

/// Order history for the calling shopper, newest first (projection read).
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
) -> Response {
    let orders = services.orders_view.list_for_shopper(ctx.shopper_id());
    Json(orders.iter().map(order_read_model_json).collect::<Vec<_>>()).into_response()
}

/// Single order detail, authoritative (rehydrated, owner or admin only).
pub async fn get(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Path(order_id): Path<String>,
) -> Response {
    let order_id = match super::common::parse_order_id(&order_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .orders
        .get_order(ctx.shopper_id(), ctx.roles(), order_id)
    {
        Ok(order) => Json(order_json(&order)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Path(order_id): Path<String>,
) -> Response {
    let order_id = match super::common::parse_order_id(&order_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .orders
        .cancel_order(ctx.shopper_id(), ctx.roles(), order_id)
    {
        Ok(order) => Json(ok_body(order_json(&order))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
