use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings at this layer; [`permissions_for_role`] is the
/// built-in policy mapping them to permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role → permission policy.
///
/// - `admin`: everything
/// - `catalog_manager`: every product operation
/// - `viewer`: product reads
///
/// Unknown roles grant nothing.
pub fn permissions_for_role(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::from_static("*")],
        "catalog_manager" => vec![Permission::from_static("product.*")],
        "viewer" => vec![
            Permission::from_static("product.find"),
            Permission::from_static("product.findone"),
        ],
        _ => Vec::new(),
    }
}
