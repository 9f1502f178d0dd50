// SPDX-License-Identifier: MPL-2.0

//! Package identities.

use std::fmt;
use std::hash::{Hash, Hasher};

/// The reserved identity of the package synthesized to anchor the top-level
/// constraints. It never leaves the solver.
const ROOT_IDENTITY: &str = "<synthesized-root>";

/// An opaque reference to a package.
///
/// Two references are the same package exactly when their identities match;
/// the display name and locality flag are presentation metadata and do not
/// participate in equality or hashing.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackageReference {
    identity: String,
    name: Option<String>,
    is_local: bool,
}

impl PackageReference {
    /// A reference to a remote package.
    pub fn remote(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            name: None,
            is_local: false,
        }
    }

    /// A reference to a package bound to a local working copy.
    pub fn local(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            name: None,
            is_local: true,
        }
    }

    /// The synthesized root package anchoring the top-level constraints.
    pub(crate) fn root() -> Self {
        Self {
            identity: ROOT_IDENTITY.to_string(),
            name: Some("root".to_string()),
            is_local: false,
        }
    }

    /// Attach a human-facing display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The stable identity string.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The display name, if one was attached.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this package is bound to a local working copy.
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub(crate) fn is_root(&self) -> bool {
        self.identity == ROOT_IDENTITY
    }
}

impl PartialEq for PackageReference {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for PackageReference {}

impl Hash for PackageReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => f.write_str(&self.identity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Map;

    #[test]
    fn equality_ignores_name_and_locality() {
        let bare = PackageReference::remote("github.com/acme/widget");
        let named = PackageReference::remote("github.com/acme/widget").with_name("widget");
        let local = PackageReference::local("github.com/acme/widget");
        assert_eq!(bare, named);
        assert_eq!(bare, local);

        let mut map: Map<PackageReference, u32> = Map::default();
        map.insert(named, 1);
        assert_eq!(map.get(&bare), Some(&1));
    }

    #[test]
    fn display_prefers_name() {
        let named = PackageReference::remote("github.com/acme/widget").with_name("widget");
        assert_eq!(named.to_string(), "widget");
        assert_eq!(
            PackageReference::remote("github.com/acme/widget").to_string(),
            "github.com/acme/widget"
        );
    }
}
