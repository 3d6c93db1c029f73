//! `storecore-stock` — the authoritative stock ledger.
//!
//! One aggregate per sellable unit (a whole product or a single color/size
//! variant). The unit's `available` counter is owned exclusively by this
//! aggregate; reserve/release/adjust are the only mutation paths.

pub mod unit;

pub use unit::{
    Adjust, RegisterUnit, Release, Reserve, StockCommand, StockEvent, StockUnit, UnitId,
};
