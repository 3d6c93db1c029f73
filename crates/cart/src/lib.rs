//! `storecore-cart` — per-shopper cart state.
//!
//! A cart line's quantity always equals the quantity currently *reserved*
//! against its unit. The ledger mutation itself lives in `storecore-stock`;
//! this aggregate only records the line items. The orchestration that pairs
//! every line mutation with the matching reserve/release lives in
//! `storecore-checkout`.

pub mod cart;

pub use cart::{
    AddLine, Cart, CartCommand, CartEvent, CartId, CartLine, Clear, ClearMode, RemoveLine,
    SetLineQuantity,
};
