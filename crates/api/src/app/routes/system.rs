use axum::{Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::context::ShopperContext;

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn whoami(Extension(ctx): Extension<ShopperContext>) -> impl IntoResponse {
    axum::Json(json!({
        "shopper_id": ctx.shopper_id().to_string(),
        "roles": ctx.roles(),
    }))
}
