//! `facet-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP, the intercom and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AccessGuard, AllowAll, AuthzError, DenyAll, PrincipalGuard, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::{Principal, PrincipalId};
pub use roles::{Role, permissions_for_role};
