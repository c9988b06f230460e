use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (the "capability tag" of an operation).
///
/// Permissions are opaque dotted strings (e.g. `"product.update"`). Two grant
/// forms exist besides exact matches:
/// - `"*"` grants everything;
/// - `"product.*"` grants every permission in the `product` namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` is enough to perform an operation requiring `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(ns) => required
                .as_str()
                .strip_prefix(ns)
                .is_some_and(|rest| rest.starts_with('.')),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_wildcard_grants_only_its_namespace() {
        let grant = Permission::new("product.*");
        assert!(grant.grants(&Permission::new("product.update")));
        assert!(!grant.grants(&Permission::new("category.update")));
        assert!(!grant.grants(&Permission::new("products.update")));
    }

    #[test]
    fn star_grants_everything() {
        assert!(Permission::new("*").grants(&Permission::new("anything.at.all")));
    }

    #[test]
    fn exact_match_grants() {
        let p = Permission::from_static("product.find");
        assert!(p.grants(&Permission::new("product.find")));
        assert!(!p.grants(&Permission::new("product.findone")));
    }
}
