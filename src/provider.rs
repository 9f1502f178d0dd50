// SPDX-License-Identifier: MPL-2.0

//! Contracts between the solver and the outside world, plus an in-memory
//! implementation for tests and offline experiments.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{BoundVersion, Map, PackageReference, Requirement, Version};

/// One dependency edge: a package and the requirement placed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    /// The required package.
    pub package: PackageReference,
    /// What is required of it.
    pub requirement: Requirement,
}

impl Constraint {
    /// Create a constraint.
    pub fn new(package: PackageReference, requirement: Requirement) -> Self {
        Self {
            package,
            requirement,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.package, self.requirement)
    }
}

/// An error from the container provider, carried through the solver
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// The provider's own description of the failure.
    pub message: String,
}

impl ProviderError {
    /// Wrap a provider failure message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A fetched package container: the provider-side view of one package.
pub trait Container: Send + Sync {
    /// The canonical reference of the contained package.
    fn identifier(&self) -> PackageReference;

    /// Available versions passing the filter, in descending order.
    fn versions(&self, filter: &dyn Fn(&Version) -> bool) -> Vec<Version>;

    /// Dependency constraints at a tagged version.
    fn dependencies(&self, version: &Version) -> Result<Vec<Constraint>, ProviderError>;

    /// Dependency constraints at a named revision.
    fn revision_dependencies(&self, revision: &str) -> Result<Vec<Constraint>, ProviderError>;

    /// Dependency constraints of the local working copy.
    fn unversioned_dependencies(&self) -> Result<Vec<Constraint>, ProviderError>;

    /// A possibly canonicalized reference for the package once bound.
    /// Containers that never rewrite identifiers keep the default.
    fn updated_identifier(&self, bound: &BoundVersion) -> PackageReference {
        let _ = bound;
        self.identifier()
    }
}

/// The asynchronous source of containers. Fetches may involve network or
/// repository I/O and are invoked from gateway worker threads; the solver
/// itself only ever talks to the gateway cache.
pub trait ContainerProvider: Send + Sync + 'static {
    /// Fetch the container for a package. `skip_update` asks the provider
    /// not to refresh an already cloned repository first.
    fn get_container(
        &self,
        package: &PackageReference,
        skip_update: bool,
    ) -> Result<Arc<dyn Container>, ProviderError>;
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct OfflineEntry {
    versions: BTreeMap<Version, Vec<Constraint>>,
    revisions: Map<String, Vec<Constraint>>,
    unversioned: Option<Vec<Constraint>>,
}

/// A [`ContainerProvider`] with all dependency information available in
/// memory.
///
/// Versions are offered newest first. Dependencies of a package version must
/// be registered in a single call; registering the same version again
/// replaces them.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct OfflineContainerProvider {
    entries: Map<PackageReference, OfflineEntry>,
}

impl OfflineContainerProvider {
    /// Creates an empty provider with no packages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the dependencies of a package at a tagged version.
    pub fn add_dependencies<I: IntoIterator<Item = Constraint>>(
        &mut self,
        package: PackageReference,
        version: impl Into<Version>,
        dependencies: I,
    ) {
        self.entries
            .entry(package)
            .or_default()
            .versions
            .insert(version.into(), dependencies.into_iter().collect());
    }

    /// Register the dependencies of a package at a named revision.
    pub fn add_revision<I: IntoIterator<Item = Constraint>>(
        &mut self,
        package: PackageReference,
        revision: impl Into<String>,
        dependencies: I,
    ) {
        self.entries
            .entry(package)
            .or_default()
            .revisions
            .insert(revision.into(), dependencies.into_iter().collect());
    }

    /// Register the dependencies of a package's local working copy.
    pub fn add_unversioned<I: IntoIterator<Item = Constraint>>(
        &mut self,
        package: PackageReference,
        dependencies: I,
    ) {
        self.entries.entry(package).or_default().unversioned =
            Some(dependencies.into_iter().collect());
    }

    /// Lists packages that have been saved.
    pub fn packages(&self) -> impl Iterator<Item = &PackageReference> {
        self.entries.keys()
    }
}

impl ContainerProvider for OfflineContainerProvider {
    fn get_container(
        &self,
        package: &PackageReference,
        _skip_update: bool,
    ) -> Result<Arc<dyn Container>, ProviderError> {
        let entry = self
            .entries
            .get(package)
            .ok_or_else(|| ProviderError::new(format!("unknown package {}", package)))?;
        Ok(Arc::new(OfflineContainer {
            identifier: package.clone(),
            entry: entry.clone(),
        }))
    }
}

struct OfflineContainer {
    identifier: PackageReference,
    entry: OfflineEntry,
}

impl Container for OfflineContainer {
    fn identifier(&self) -> PackageReference {
        self.identifier.clone()
    }

    fn versions(&self, filter: &dyn Fn(&Version) -> bool) -> Vec<Version> {
        self.entry
            .versions
            .keys()
            .rev()
            .filter(|version| filter(version))
            .cloned()
            .collect()
    }

    fn dependencies(&self, version: &Version) -> Result<Vec<Constraint>, ProviderError> {
        self.entry.versions.get(version).cloned().ok_or_else(|| {
            ProviderError::new(format!("{} has no version {}", self.identifier, version))
        })
    }

    fn revision_dependencies(&self, revision: &str) -> Result<Vec<Constraint>, ProviderError> {
        self.entry.revisions.get(revision).cloned().ok_or_else(|| {
            ProviderError::new(format!("{} has no revision {}", self.identifier, revision))
        })
    }

    fn unversioned_dependencies(&self) -> Result<Vec<Constraint>, ProviderError> {
        self.entry.unversioned.clone().ok_or_else(|| {
            ProviderError::new(format!("{} has no local working copy", self.identifier))
        })
    }
}
