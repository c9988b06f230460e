//! API-side access guard.
//!
//! Each request gets a guard bound to its principal; the product dispatcher
//! asks it before touching storage.

use facet_auth::PrincipalGuard;

use crate::context::PrincipalContext;

pub fn guard_for(principal: &PrincipalContext) -> PrincipalGuard {
    PrincipalGuard::new(principal.principal().clone())
}
