use thiserror::Error;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.permissions.iter().any(|p| p.grants(required)) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Access-check middleware in front of every operation.
///
/// Handlers ask the guard before touching storage; a denial is final.
pub trait AccessGuard: Send + Sync {
    fn check(&self, required: &Permission) -> Result<(), AuthzError>;
}

impl<G> AccessGuard for std::sync::Arc<G>
where
    G: AccessGuard + ?Sized,
{
    fn check(&self, required: &Permission) -> Result<(), AuthzError> {
        (**self).check(required)
    }
}

/// Guard for trusted in-process callers (e.g. the host publishing on the intercom).
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessGuard for AllowAll {
    fn check(&self, _required: &Permission) -> Result<(), AuthzError> {
        Ok(())
    }
}

/// Guard that refuses everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl AccessGuard for DenyAll {
    fn check(&self, required: &Permission) -> Result<(), AuthzError> {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Guard bound to an authenticated principal.
#[derive(Debug, Clone)]
pub struct PrincipalGuard {
    principal: Principal,
}

impl PrincipalGuard {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

impl AccessGuard for PrincipalGuard {
    fn check(&self, required: &Permission) -> Result<(), AuthzError> {
        let outcome = authorize(&self.principal, required);
        if outcome.is_err() {
            tracing::debug!(
                principal_id = %self.principal.principal_id,
                permission = %required,
                "access denied"
            );
        }
        outcome
    }
}
