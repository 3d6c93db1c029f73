//! Ownership and role checks at the service boundary.
//!
//! The storefront has exactly two authorization questions: "is this actor an
//! administrator?" and "is this actor the owner of the resource, or an
//! administrator?". Keep them here so handlers and services agree on the
//! answer.

use thiserror::Error;

use storecore_core::ShopperId;

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("administrator role required")]
    AdminRequired,

    #[error("actor does not own this resource")]
    NotOwner,
}

/// Require the `admin` role.
pub fn ensure_admin(roles: &[Role]) -> Result<(), AuthzError> {
    if roles.iter().any(Role::is_admin) {
        Ok(())
    } else {
        Err(AuthzError::AdminRequired)
    }
}

/// Require that the actor owns the resource, or carries the `admin` role.
pub fn ensure_owner_or_admin(
    actor: ShopperId,
    roles: &[Role],
    owner: ShopperId,
) -> Result<(), AuthzError> {
    if actor == owner {
        return Ok(());
    }
    ensure_admin(roles).map_err(|_| AuthzError::NotOwner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_passes_without_roles() {
        let owner = ShopperId::new();
        assert_eq!(ensure_owner_or_admin(owner, &[], owner), Ok(()));
    }

    #[test]
    fn stranger_without_admin_is_rejected() {
        let owner = ShopperId::new();
        let actor = ShopperId::new();
        assert_eq!(
            ensure_owner_or_admin(actor, &[], owner),
            Err(AuthzError::NotOwner)
        );
    }

    #[test]
    fn admin_may_act_on_other_shoppers_resources() {
        let owner = ShopperId::new();
        let actor = ShopperId::new();
        assert_eq!(
            ensure_owner_or_admin(actor, &[Role::admin()], owner),
            Ok(())
        );
    }

    #[test]
    fn admin_check_ignores_other_roles() {
        assert_eq!(
            ensure_admin(&[Role::new("support")]),
            Err(AuthzError::AdminRequired)
        );
        assert_eq!(ensure_admin(&[Role::new("support"), Role::admin()]), Ok(()));
    }
}
