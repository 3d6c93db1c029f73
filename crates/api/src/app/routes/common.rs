use axum::http::StatusCode;
use axum::response::Response;

use storecore_core::AggregateId;
use storecore_orders::OrderId;
use storecore_stock::UnitId;

use crate::app::errors::json_error;

pub fn parse_unit_id(raw: &str) -> Result<UnitId, Response> {
    parse_id(raw).map(UnitId::new)
}

pub fn parse_order_id(raw: &str) -> Result<OrderId, Response> {
    parse_id(raw).map(OrderId::new)
}

fn parse_id(raw: &str) -> Result<AggregateId, Response> {
    raw.parse::<AggregateId>()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "VALIDATION", "invalid id"))
}
