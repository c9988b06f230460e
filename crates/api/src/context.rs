use facet_auth::{Principal, PrincipalId, Role};

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self {
            principal: Principal::new(principal_id, roles),
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.roles
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
