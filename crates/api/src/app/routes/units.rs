use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::app::dto::stock_level_json;
use crate::app::errors::json_error;
use crate::app::services::AppServices;

/// Catalog listing from the stock-levels projection (eventually consistent).
pub async fn list(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let levels = services.stock_levels.list();
    Json(levels.iter().map(stock_level_json).collect::<Vec<_>>()).into_response()
}

pub async fn get(
    Extension(services): Extension<Arc<AppServices>>,
    Path(unit_id): Path<String>,
) -> Response {
    let unit_id = match super::common::parse_unit_id(&unit_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.stock_levels.get(&unit_id) {
        Some(level) => Json(stock_level_json(&level)).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "UNIT_NOT_FOUND", "unknown unit"),
    }
}
