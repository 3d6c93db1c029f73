use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;

use storecore_auth::ensure_admin;
use storecore_checkout::{NewUnit, StatusUpdate};
use storecore_orders::{OrderStatus, TrackingInfo};

use crate::app::dto::{
    AdjustStockRequest, RegisterUnitRequest, UpdateOrderRequest, ok_body, order_json,
    order_read_model_json, unit_json,
};
use crate::app::errors::{json_error, service_error_to_response};
use crate::app::services::AppServices;
use crate::context::ShopperContext;

pub fn router() -> Router {
    Router::new()
        .route("/units", post(register_unit))
        .route("/units/:id/adjust", post(adjust_stock))
        .route("/orders", get(list_orders))
        .route("/orders/:id", put(update_order))
}

pub async fn register_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Json(body): Json<RegisterUnitRequest>,
) -> Response {
    let new_unit = NewUnit {
        name: body.name,
        unit_price: body.unit_price,
        initial_stock: body.initial_stock,
        color_label: body.color_label,
        size_label: body.size_label,
    };

    match services.stock.register_unit(ctx.roles(), new_unit) {
        Ok(unit) => (StatusCode::CREATED, Json(unit_json(&unit))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// Signed manual correction. Negative deltas may not take availability below
/// the reserved and committed quantities.
pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Path(unit_id): Path<String>,
    Json(body): Json<AdjustStockRequest>,
) -> Response {
    let unit_id = match super::common::parse_unit_id(&unit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.stock.adjust(ctx.roles(), unit_id, body.delta) {
        Ok(unit) => Json(unit_json(&unit)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Query(query): Query<ListOrdersQuery>,
) -> Response {
    if ensure_admin(ctx.roles()).is_err() {
        return json_error(StatusCode::FORBIDDEN, "FORBIDDEN", "forbidden");
    }

    let orders = match query.status.as_deref() {
        Some(raw) => match raw.parse::<OrderStatus>() {
            Ok(status) => services.orders_view.list_with_status(status),
            Err(_) => {
                return json_error(StatusCode::BAD_REQUEST, "VALIDATION", "unknown status");
            }
        },
        None => services.orders_view.list(),
    };

    Json(orders.iter().map(order_read_model_json).collect::<Vec<_>>()).into_response()
}

/// Fulfilment transition. Moving to `cancelled` releases the order's stock.
pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ShopperContext>,
    Path(order_id): Path<String>,
    Json(body): Json<UpdateOrderRequest>,
) -> Response {
    let order_id = match super::common::parse_order_id(&order_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let new_status = match body.status.parse::<OrderStatus>() {
        Ok(status) => status,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "VALIDATION", "unknown status"),
    };

    let tracking = body.tracking_number.map(|tracking_number| TrackingInfo {
        tracking_number,
        tracking_url: body.tracking_url,
    });

    let update = StatusUpdate {
        new_status,
        tracking,
    };

    match services.orders.update_status(ctx.roles(), order_id, update) {
        Ok(order) => Json(ok_body(order_json(&order))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
