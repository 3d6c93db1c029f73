use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use storecore_checkout::ServiceError;

/// Map the application error taxonomy onto HTTP responses.
///
/// Insufficient stock always reports the observed `available` so the client
/// can offer an adjusted quantity. Transient conflicts become 503: the request
/// was well-formed and may succeed if simply retried.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::InsufficientStock {
            unit_id,
            requested,
            available,
        } => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "INSUFFICIENT_STOCK",
                "unit_id": unit_id.to_string(),
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        ServiceError::UnitNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "UNIT_NOT_FOUND", err.to_string())
        }
        ServiceError::OrderNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", err.to_string())
        }
        ServiceError::LineNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "LINE_NOT_FOUND", err.to_string())
        }
        ServiceError::EmptyCart => json_error(StatusCode::BAD_REQUEST, "EMPTY_CART", "cart is empty"),
        ServiceError::Forbidden => json_error(StatusCode::FORBIDDEN, "FORBIDDEN", "forbidden"),
        ServiceError::CancellationNotAllowed => json_error(
            StatusCode::CONFLICT,
            "CANCELLATION_NOT_ALLOWED",
            "order can no longer be cancelled",
        ),
        ServiceError::InvalidTransition { ref from, ref to } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "INVALID_TRANSITION",
                "from": from,
                "to": to,
            })),
        )
            .into_response(),
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "VALIDATION", msg),
        ServiceError::InvariantViolation(msg) => {
            json_error(StatusCode::CONFLICT, "INVARIANT_VIOLATION", msg)
        }
        ServiceError::Conflict(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "CONFLICT", msg),
        ServiceError::Internal(msg) => {
            tracing::error!(%msg, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "internal error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
