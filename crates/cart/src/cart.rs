use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storecore_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopperId};
use storecore_events::Event;
use storecore_stock::UnitId;

/// Cart identifier. One cart per shopper: the cart's aggregate id is the
/// shopper's uuid, so a shopper's cart stream is found without an index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(pub AggregateId);

impl CartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn for_shopper(shopper_id: ShopperId) -> Self {
        Self(AggregateId::from_uuid(*shopper_id.as_uuid()))
    }
}

impl core::fmt::Display for CartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How a cart is emptied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearMode {
    /// Stock was released back to the ledger (explicit "empty cart").
    Released,
    /// Checkout: lines are deleted but the ledger stays decremented, turning
    /// the reservation into a permanent commitment.
    Committed,
}

/// A pending reservation against one sellable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub unit_id: UnitId,
    pub quantity: u32,
    /// Price snapshot in smallest currency unit, taken when the line was created.
    pub unit_price: u64,
    pub color_label: Option<String>,
    pub size_label: Option<String>,
}

/// Aggregate root: Cart.
///
/// Carts are created implicitly on first add and live at version 0 while empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    id: CartId,
    lines: Vec<CartLine>,
    version: u64,
}

impl Cart {
    pub fn empty(id: CartId) -> Self {
        Self {
            id,
            lines: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> CartId {
        self.id
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, unit_id: UnitId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.unit_id == unit_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of `quantity * unit_price` over all lines.
    pub fn total(&self) -> u64 {
        self.lines
            .iter()
            .map(|l| u64::from(l.quantity) * l.unit_price)
            .sum()
    }
}

impl AggregateRoot for Cart {
    type Id = CartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddLine (first add of a unit; merging with an existing line is the
/// caller's job, expressed as SetLineQuantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub cart_id: CartId,
    pub unit_id: UnitId,
    pub qty: u32,
    pub unit_price: u64,
    pub color_label: Option<String>,
    pub size_label: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetLineQuantity (absolute new quantity, must stay >= 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLineQuantity {
    pub cart_id: CartId,
    pub unit_id: UnitId,
    pub qty: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub cart_id: CartId,
    pub unit_id: UnitId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Clear (all lines at once; the mode records whether stock was
/// released or committed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clear {
    pub cart_id: CartId,
    pub mode: ClearMode,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartCommand {
    AddLine(AddLine),
    SetLineQuantity(SetLineQuantity),
    RemoveLine(RemoveLine),
    Clear(Clear),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartEvent {
    LineAdded {
        cart_id: CartId,
        unit_id: UnitId,
        qty: u32,
        unit_price: u64,
        color_label: Option<String>,
        size_label: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    LineQuantityChanged {
        cart_id: CartId,
        unit_id: UnitId,
        qty: u32,
        occurred_at: DateTime<Utc>,
    },
    LineRemoved {
        cart_id: CartId,
        unit_id: UnitId,
        occurred_at: DateTime<Utc>,
    },
    Cleared {
        cart_id: CartId,
        mode: ClearMode,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::LineAdded { .. } => "cart.line_added",
            CartEvent::LineQuantityChanged { .. } => "cart.line_quantity_changed",
            CartEvent::LineRemoved { .. } => "cart.line_removed",
            CartEvent::Cleared { .. } => "cart.cleared",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CartEvent::LineAdded { occurred_at, .. }
            | CartEvent::LineQuantityChanged { occurred_at, .. }
            | CartEvent::LineRemoved { occurred_at, .. }
            | CartEvent::Cleared { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Cart {
    type Command = CartCommand;
    type Event = CartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CartEvent::LineAdded {
                unit_id,
                qty,
                unit_price,
                color_label,
                size_label,
                ..
            } => {
                self.lines.push(CartLine {
                    unit_id: *unit_id,
                    quantity: *qty,
                    unit_price: *unit_price,
                    color_label: color_label.clone(),
                    size_label: size_label.clone(),
                });
            }
            CartEvent::LineQuantityChanged { unit_id, qty, .. } => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.unit_id == *unit_id) {
                    line.quantity = *qty;
                }
            }
            CartEvent::LineRemoved { unit_id, .. } => {
                self.lines.retain(|l| l.unit_id != *unit_id);
            }
            CartEvent::Cleared { .. } => {
                self.lines.clear();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CartCommand::AddLine(cmd) => self.handle_add_line(cmd),
            CartCommand::SetLineQuantity(cmd) => self.handle_set_quantity(cmd),
            CartCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            CartCommand::Clear(cmd) => self.handle_clear(cmd),
        }
    }
}

impl Cart {
    fn ensure_cart_id(&self, cart_id: CartId) -> Result<(), DomainError> {
        if self.id != cart_id {
            return Err(DomainError::invariant("cart_id mismatch"));
        }
        Ok(())
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_cart_id(cmd.cart_id)?;

        if cmd.qty == 0 {
            return Err(DomainError::validation("qty must be positive"));
        }
        if self.line(cmd.unit_id).is_some() {
            return Err(DomainError::conflict("line already exists for unit"));
        }

        Ok(vec![CartEvent::LineAdded {
            cart_id: cmd.cart_id,
            unit_id: cmd.unit_id,
            qty: cmd.qty,
            unit_price: cmd.unit_price,
            color_label: cmd.color_label.clone(),
            size_label: cmd.size_label.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_set_quantity(&self, cmd: &SetLineQuantity) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_cart_id(cmd.cart_id)?;

        if cmd.qty == 0 {
            return Err(DomainError::validation(
                "qty must be positive; remove the line instead",
            ));
        }
        if self.line(cmd.unit_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![CartEvent::LineQuantityChanged {
            cart_id: cmd.cart_id,
            unit_id: cmd.unit_id,
            qty: cmd.qty,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_cart_id(cmd.cart_id)?;

        if self.line(cmd.unit_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![CartEvent::LineRemoved {
            cart_id: cmd.cart_id,
            unit_id: cmd.unit_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_clear(&self, cmd: &Clear) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_cart_id(cmd.cart_id)?;

        if self.lines.is_empty() {
            return Err(DomainError::validation("cart is already empty"));
        }

        Ok(vec![CartEvent::Cleared {
            cart_id: cmd.cart_id,
            mode: cmd.mode,
            occurred_at: cmd.occurred_at,
        }])
    }
}
