use std::sync::Arc;

use axum::{
    Extension, Json,
    response::{IntoResponse, Response},
};

use crate::app::dto::{
    AddCartItemRequest, RemoveCartItemRequest, UpdateCartItemRequest, cart_json, ok_body,
};
use crate::app::errors::service_error_to_response;
use crate::app::services::AppServices;
use crate::context::ShopperContext;

pub async fn view(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
) -> Response {
    match services.cart.view_cart(ctx.shopper_id()) {
        Ok(cart) => Json(cart_json(&cart)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Json(body): Json<AddCartItemRequest>,
) -> Response {
    let unit_id = match super::common::parse_unit_id(&body.unit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.cart.add_item(ctx.shopper_id(), unit_id, body.qty) {
        Ok(cart) => Json(ok_body(cart_json(&cart))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// Set an absolute line quantity. Zero or negative removes the line.
pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Json(body): Json<UpdateCartItemRequest>,
) -> Response {
    let unit_id = match super::common::parse_unit_id(&body.unit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let result = if body.qty <= 0 {
        services.cart.remove_item(ctx.shopper_id(), unit_id)
    } else {
        let qty = u32::try_from(body.qty).unwrap_or(u32::MAX);
        services.cart.change_quantity(ctx.shopper_id(), unit_id, qty)
    };

    match result {
        Ok(cart) => Json(ok_body(cart_json(&cart))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Json(body): Json<RemoveCartItemRequest>,
) -> Response {
    let unit_id = match super::common::parse_unit_id(&body.unit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.cart.remove_item(ctx.shopper_id(), unit_id) {
        Ok(cart) => Json(ok_body(cart_json(&cart))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

pub async fn clear(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
) -> Response {
    match services.cart.clear_cart(ctx.shopper_id()) {
        Ok(cart) => Json(ok_body(cart_json(&cart))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
