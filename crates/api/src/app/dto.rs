//! Request DTOs and JSON response builders.
//!
//! Responses are built with `serde_json::json!` so the wire shape is explicit
//! at the boundary instead of leaking aggregate internals.

use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use storecore_cart::Cart;
use storecore_infra::projections::{OrderReadModel, StockLevelReadModel};
use storecore_orders::{Order, PaymentStatus, ShippingAddress};
use storecore_stock::StockUnit;

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub unit_id: String,
    pub qty: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub unit_id: String,
    /// New absolute quantity. Zero or negative removes the line.
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveCartItemRequest {
    pub unit_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ShippingAddressDto {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl From<ShippingAddressDto> for ShippingAddress {
    fn from(dto: ShippingAddressDto) -> Self {
        Self {
            full_name: dto.full_name,
            line1: dto.line1,
            line2: dto.line2,
            city: dto.city,
            postal_code: dto.postal_code,
            country: dto.country,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequestBody {
    pub shipping_address: ShippingAddressDto,
    pub payment_method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: String,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUnitRequest {
    pub name: String,
    /// Smallest currency unit.
    pub unit_price: u64,
    pub initial_stock: u32,
    pub color_label: Option<String>,
    pub size_label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookRequest {
    pub order_id: String,
    pub outcome: PaymentStatus,
}

/// Mutation responses carry `"ok": true` alongside the resulting resource.
pub fn ok_body(mut body: JsonValue) -> JsonValue {
    body["ok"] = JsonValue::Bool(true);
    body
}

pub fn cart_json(cart: &Cart) -> JsonValue {
    json!({
        "cart_id": cart.id_typed().0.to_string(),
        "lines": cart.lines().iter().map(|l| json!({
            "unit_id": l.unit_id.to_string(),
            "quantity": l.quantity,
            "unit_price": l.unit_price,
            "line_total": u64::from(l.quantity) * l.unit_price,
            "color_label": l.color_label,
            "size_label": l.size_label,
        })).collect::<Vec<_>>(),
        "total": cart.total(),
    })
}

pub fn order_json(order: &Order) -> JsonValue {
    json!({
        "order_id": order.id_typed().0.to_string(),
        "order_number": order.order_number(),
        "shopper_id": order.shopper_id().map(|s| s.to_string()),
        "status": order.status(),
        "payment_status": order.payment_status(),
        "lines": order.lines().iter().map(|l| json!({
            "unit_id": l.unit_id.to_string(),
            "quantity": l.quantity,
            "unit_price": l.unit_price,
            "line_total": l.line_total(),
            "color_label": l.color_label,
            "size_label": l.size_label,
        })).collect::<Vec<_>>(),
        "total": order.total(),
        "shipping_address": order.shipping_address(),
        "tracking": order.tracking(),
        "created_at": order.created_at(),
        "shipped_at": order.shipped_at(),
        "delivered_at": order.delivered_at(),
    })
}

pub fn unit_json(unit: &StockUnit) -> JsonValue {
    json!({
        "unit_id": unit.id_typed().to_string(),
        "name": unit.name(),
        "unit_price": unit.unit_price(),
        "color_label": unit.color_label(),
        "size_label": unit.size_label(),
        "available": unit.available(),
    })
}

pub fn stock_level_json(level: &StockLevelReadModel) -> JsonValue {
    json!({
        "unit_id": level.unit_id.to_string(),
        "name": level.name,
        "unit_price": level.unit_price,
        "color_label": level.color_label,
        "size_label": level.size_label,
        "available": level.available,
    })
}

pub fn order_read_model_json(order: &OrderReadModel) -> JsonValue {
    json!({
        "order_id": order.order_id.to_string(),
        "order_number": order.order_number,
        "shopper_id": order.shopper_id.to_string(),
        "status": order.status,
        "payment_status": order.payment_status,
        "lines": order.lines.iter().map(|l| json!({
            "unit_id": l.unit_id.to_string(),
            "quantity": l.quantity,
            "unit_price": l.unit_price,
            "line_total": l.line_total(),
            "color_label": l.color_label,
            "size_label": l.size_label,
        })).collect::<Vec<_>>(),
        "total": order.total,
        "shipping_address": order.shipping_address,
        "tracking": order.tracking,
        "created_at": order.created_at,
        "shipped_at": order.shipped_at,
        "delivered_at": order.delivered_at,
    })
}
