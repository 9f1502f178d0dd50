// SPDX-License-Identifier: MPL-2.0

//! PubGrub-style version solving for package dependency graphs.
//!
//! Given a set of top-level constraints, the solver assigns a concrete
//! binding — a tagged version, a named revision, or a local working copy —
//! to every transitively required package, so that all dependency
//! constraints hold. When that is impossible, it derives a proof and renders
//! it as a numbered, human-readable explanation:
//!
//! ```txt
//! (1) Because b ^1.0.0 depends on c ^1.0.0 and root depends on c ^2.0.0,
//!     b ^1.0.0 is forbidden.
//! And because a ^1.0.0 depends on b ^1.0.0 and root depends on a ^1.0.0,
//!     version solving failed.
//! ```
//!
//! # API
//!
//! ```
//! use std::sync::Arc;
//! use depsolve::{
//!     Constraint, OfflineContainerProvider, PackageReference, Requirement, Solver, VersionSet,
//! };
//!
//! let mut provider = OfflineContainerProvider::new();
//! let a = PackageReference::remote("a");
//! provider.add_dependencies(a.clone(), (1, 0, 0), []);
//!
//! let mut solver = Solver::new(Arc::new(provider));
//! let constraint = Constraint::new(
//!     a,
//!     Requirement::version_set(VersionSet::up_to_next_major((1, 0, 0))),
//! );
//! let solution = solver.solve(&[constraint], &[]).unwrap();
//! assert_eq!(solution.len(), 1);
//! ```
//!
//! Container contents come from a [`ContainerProvider`]; the
//! [`OfflineContainerProvider`] serves them from memory for tests and
//! offline experiments. Package fetches are cached and may be warmed in the
//! background with [`Solver::prefetch`]. Solver actions can be traced as
//! values through a [`TraceSink`], to a file, or to a stream.

#![warn(missing_docs)]

mod error;
mod gateway;
mod internal;
mod package;
mod provider;
mod report;
mod requirement;
mod solver;
mod term;
mod trace;
mod type_aliases;
mod version;

pub use error::SolveError;
pub use package::PackageReference;
pub use provider::{Constraint, Container, ContainerProvider, OfflineContainerProvider, ProviderError};
pub use requirement::{BoundVersion, Requirement, VersionSet};
pub use solver::{Solver, SolverOptions};
pub use term::{SetRelation, Term};
pub use trace::{StepKind, StepLocation, TraceSink, TraceStep};
pub use type_aliases::{Map, Set, Solution};
pub use version::{PreReleaseIdentifier, Version, VersionParseError};
