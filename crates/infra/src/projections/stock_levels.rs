use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use storecore_core::AggregateId;
use storecore_events::EventEnvelope;
use storecore_stock::{StockEvent, UnitId};

use crate::read_model::ReadStore;

/// Denormalized stock level for product pages and admin listings.
///
/// `available` here is display data; a shopper can see "in stock" and still
/// lose the race at add-to-cart time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevelReadModel {
    pub unit_id: UnitId,
    pub name: String,
    pub unit_price: u64,
    pub color_label: Option<String>,
    pub size_label: Option<String>,
    pub available: u32,
}

#[derive(Debug, Error)]
pub enum StockLevelsProjectionError {
    #[error("failed to deserialize stock event: {0}")]
    Deserialize(String),
    #[error("event unit_id does not match envelope aggregate_id")]
    AggregateMismatch,
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projects `stock.unit` events into [`StockLevelReadModel`]s.
///
/// Per-aggregate cursors make redelivery idempotent: a sequence number at or
/// below the cursor is skipped, a gap is an error.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: ReadStore<UnitId, StockLevelReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> StockLevelsProjection<S>
where
    S: ReadStore<UnitId, StockLevelReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn get_cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors.get(&aggregate_id).unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, seq);
        }
    }

    pub fn get(&self, unit_id: &UnitId) -> Option<StockLevelReadModel> {
        self.store.get(unit_id)
    }

    pub fn list(&self) -> Vec<StockLevelReadModel> {
        self.store.list()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockLevelsProjectionError> {
        if envelope.aggregate_type() != "stock.unit" {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(aggregate_id);
        if seq == 0 {
            return Err(StockLevelsProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(StockLevelsProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: StockEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockLevelsProjectionError::Deserialize(e.to_string()))?;

        let unit_id = match &ev {
            StockEvent::UnitRegistered { unit_id, .. }
            | StockEvent::StockReserved { unit_id, .. }
            | StockEvent::StockReleased { unit_id, .. }
            | StockEvent::StockAdjusted { unit_id, .. } => *unit_id,
        };

        if unit_id.0 != aggregate_id {
            return Err(StockLevelsProjectionError::AggregateMismatch);
        }

        match ev {
            StockEvent::UnitRegistered {
                unit_id,
                name,
                unit_price,
                initial_stock,
                color_label,
                size_label,
                ..
            } => {
                self.store.upsert(
                    unit_id,
                    StockLevelReadModel {
                        unit_id,
                        name,
                        unit_price,
                        color_label,
                        size_label,
                        available: initial_stock,
                    },
                );
            }
            StockEvent::StockReserved { unit_id, qty, .. } => {
                if let Some(mut rm) = self.store.get(&unit_id) {
                    rm.available = rm.available.saturating_sub(qty);
                    self.store.upsert(unit_id, rm);
                }
            }
            StockEvent::StockReleased { unit_id, qty, .. } => {
                if let Some(mut rm) = self.store.get(&unit_id) {
                    rm.available = rm.available.saturating_add(qty);
                    self.store.upsert(unit_id, rm);
                }
            }
            StockEvent::StockAdjusted { unit_id, delta, .. } => {
                if let Some(mut rm) = self.store.get(&unit_id) {
                    let next = i64::from(rm.available) + delta;
                    rm.available = u32::try_from(next.max(0)).unwrap_or(u32::MAX);
                    self.store.upsert(unit_id, rm);
                }
            }
        }

        self.update_cursor(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild from a full event history (clears the store first).
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockLevelsProjectionError> {
        self.store.clear();
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
