use storecore_auth::Role;
use storecore_core::ShopperId;

/// Authenticated identity for a request (shopper + roles).
///
/// Inserted by the auth middleware; must be present for all protected routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopperContext {
    shopper_id: ShopperId,
    roles: Vec<Role>,
}

impl ShopperContext {
    pub fn new(shopper_id: ShopperId, roles: Vec<Role>) -> Self {
        Self { shopper_id, roles }
    }

    pub fn shopper_id(&self) -> ShopperId {
        self.shopper_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
