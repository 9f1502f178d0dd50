// SPDX-License-Identifier: MPL-2.0

//! Publicly exported type aliases.

use crate::{BoundVersion, PackageReference};

/// Map implementation used by the library.
pub type Map<K, V> = rustc_hash::FxHashMap<K, V>;

/// Set implementation used by the library.
pub type Set<V> = rustc_hash::FxHashSet<V>;

/// The bindings produced by a successful [solve](crate::Solver::solve), in
/// the order the packages were decided.
pub type Solution = Vec<(PackageReference, BoundVersion)>;
