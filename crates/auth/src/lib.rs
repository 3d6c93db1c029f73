//! `storecore-auth` — bearer identity for the storefront boundary.
//!
//! Identity *issuance* is an external collaborator; this crate only verifies
//! tokens and answers ownership/role questions. It is intentionally decoupled
//! from HTTP.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod roles;

pub use authorize::{AuthzError, ensure_admin, ensure_owner_or_admin};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use roles::Role;
