// SPDX-License-Identifier: MPL-2.0

//! Errors a solve can surface.
//!
//! Internal invariant violations (a decision on an excluded binding, an
//! incompatibility normalizing to nothing, an unsatisfied satisfier lookup)
//! are bugs, not recoverable conditions, and panic instead of appearing
//! here.

use crate::{Constraint, PackageReference, ProviderError};

/// Why a solve did not produce an assignment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolveError {
    /// The solver proved that no assignment satisfies every constraint.
    /// The diagnostic is the rendered explanation of the proof.
    #[error("{diagnostic}")]
    Unresolvable {
        /// Numbered, human-readable explanation of the failure.
        diagnostic: String,
    },

    /// Exactly pinned constraints that no already-fetched container can
    /// satisfy while the solver is confined to its cache.
    #[error("no versions available for {}", display_constraints(.0))]
    MissingVersions(Vec<Constraint>),

    /// A version-constrained dependency transitively imposes revision pins.
    #[error("the versioned dependency {dependency} requires revision-pinned packages {}", display_revisions(.revisions))]
    IncompatibleConstraints {
        /// The versioned dependency whose graph imposes the pins.
        dependency: Constraint,
        /// The packages pinned to revisions underneath it.
        revisions: Vec<(PackageReference, String)>,
    },

    /// Revision dependencies form a cycle through this package.
    #[error("the revision dependencies of {0} form a cycle")]
    Cycle(PackageReference),

    /// The container provider failed; its error is carried verbatim.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

fn display_constraints(constraints: &[Constraint]) -> String {
    constraints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_revisions(revisions: &[(PackageReference, String)]) -> String {
    revisions
        .iter()
        .map(|(package, revision)| format!("{} @{}", package, revision))
        .collect::<Vec<_>>()
        .join(", ")
}
