use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use storecore_auth::{Role, ensure_admin};
use storecore_events::{EventBus, EventEnvelope};
use storecore_infra::{CommandDispatcher, EventStore};
use storecore_stock::{Adjust, RegisterUnit, StockCommand, StockUnit, UnitId};

use crate::error::ServiceError;
use crate::retry::with_conflict_retry;

/// Catalog entry for a new sellable unit.
#[derive(Debug, Clone)]
pub struct NewUnit {
    pub name: String,
    pub unit_price: u64,
    pub initial_stock: u32,
    pub color_label: Option<String>,
    pub size_label: Option<String>,
}

/// Administrative ledger operations plus the authoritative unit read.
pub struct StockService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for StockService<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> StockService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    pub fn register_unit(&self, roles: &[Role], new_unit: NewUnit) -> Result<StockUnit, ServiceError> {
        ensure_admin(roles).map_err(|_| ServiceError::Forbidden)?;

        let unit_id = UnitId::new(storecore_core::AggregateId::new());

        with_conflict_retry(|| {
            self.dispatcher.dispatch::<StockUnit>(
                unit_id.0,
                "stock.unit",
                StockCommand::RegisterUnit(RegisterUnit {
                    unit_id,
                    name: new_unit.name.clone(),
                    unit_price: new_unit.unit_price,
                    initial_stock: new_unit.initial_stock,
                    color_label: new_unit.color_label.clone(),
                    size_label: new_unit.size_label.clone(),
                    occurred_at: Utc::now(),
                }),
                |id| StockUnit::empty(UnitId(id)),
            )
        })
        .map_err(|e| ServiceError::from_unit_dispatch(unit_id, e))?;

        tracing::info!(%unit_id, name = %new_unit.name, stock = new_unit.initial_stock, "unit registered");
        self.get_unit(unit_id)
    }

    /// Signed stock correction (restock, write-off). Never allowed to push the
    /// counter below zero.
    pub fn adjust(&self, roles: &[Role], unit_id: UnitId, delta: i64) -> Result<StockUnit, ServiceError> {
        ensure_admin(roles).map_err(|_| ServiceError::Forbidden)?;

        with_conflict_retry(|| {
            self.dispatcher.dispatch::<StockUnit>(
                unit_id.0,
                "stock.unit",
                StockCommand::Adjust(Adjust {
                    unit_id,
                    delta,
                    occurred_at: Utc::now(),
                }),
                |id| StockUnit::empty(UnitId(id)),
            )
        })
        .map_err(|e| ServiceError::from_unit_dispatch(unit_id, e))?;

        self.get_unit(unit_id)
    }

    /// Rehydrated unit state (authoritative availability).
    pub fn get_unit(&self, unit_id: UnitId) -> Result<StockUnit, ServiceError> {
        let unit = self
            .dispatcher
            .load::<StockUnit>(unit_id.0, |id| StockUnit::empty(UnitId(id)))
            .map_err(|e| ServiceError::from_unit_dispatch(unit_id, e))?;
        if !unit.is_registered() {
            return Err(ServiceError::UnitNotFound(unit_id));
        }
        Ok(unit)
    }
}
