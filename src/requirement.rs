// SPDX-License-Identifier: MPL-2.0

//! Version sets and the requirements placed on packages.
//!
//! A [`VersionSet`] is a single contiguous region of the version line: all
//! versions, none, exactly one, or a half-open range. A [`Requirement`] widens
//! that to the three shapes a dependency can take: a version set, a pinned
//! revision, or a local unversioned binding.

use std::fmt;

use crate::Version;

/// A set of versions.
///
/// `Exact(v)` is equivalent to the half-open range `[v, successor(v))`, where
/// `successor` is the tightest version strictly above `v`. `Empty` is the
/// identity for union and the annihilator for intersection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VersionSet {
    /// Every version.
    Any,
    /// No version.
    Empty,
    /// Exactly one version.
    Exact(Version),
    /// The half-open range `[lower, upper)`.
    Range {
        /// Inclusive lower bound.
        lower: Version,
        /// Exclusive upper bound.
        upper: Version,
    },
}

impl VersionSet {
    /// The set of all versions.
    pub fn any() -> Self {
        VersionSet::Any
    }

    /// The set containing no version.
    pub fn empty() -> Self {
        VersionSet::Empty
    }

    /// The set containing only the given version.
    pub fn exact(version: impl Into<Version>) -> Self {
        VersionSet::Exact(version.into())
    }

    /// The half-open range `[lower, upper)`, normalized: a disordered range
    /// collapses to `Empty` and a range holding a single version to `Exact`.
    pub fn range(lower: impl Into<Version>, upper: impl Into<Version>) -> Self {
        let (lower, upper) = (lower.into(), upper.into());
        if lower >= upper {
            VersionSet::Empty
        } else if upper == lower.epsilon_successor() {
            VersionSet::Exact(lower)
        } else {
            VersionSet::Range { lower, upper }
        }
    }

    /// The caret range `[v, next_major(v))`.
    pub fn up_to_next_major(version: impl Into<Version>) -> Self {
        let lower = version.into();
        let upper = lower.next_major();
        VersionSet::range(lower, upper)
    }

    /// Whether the version is a member of this set.
    ///
    /// Ranges admit a pre-release version only when one of their bounds is
    /// itself a pre-release on the same `major.minor.patch` triple; a plain
    /// range never matches pre-releases of other versions.
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            VersionSet::Any => true,
            VersionSet::Empty => false,
            VersionSet::Exact(exact) => exact == version,
            VersionSet::Range { lower, upper } => {
                if !(lower <= version && version < upper) {
                    return false;
                }
                if version.is_prerelease() {
                    return (lower.is_prerelease() && version.same_triple(lower))
                        || (upper.is_prerelease() && version.same_triple(upper));
                }
                true
            }
        }
    }

    /// The set of versions in both sets.
    pub fn intersection(&self, other: &VersionSet) -> VersionSet {
        match (self, other) {
            (VersionSet::Any, _) => other.clone(),
            (_, VersionSet::Any) => self.clone(),
            (VersionSet::Empty, _) | (_, VersionSet::Empty) => VersionSet::Empty,
            (VersionSet::Exact(a), VersionSet::Exact(b)) => {
                if a == b {
                    self.clone()
                } else {
                    VersionSet::Empty
                }
            }
            (VersionSet::Exact(a), VersionSet::Range { .. }) => {
                if other.contains(a) {
                    self.clone()
                } else {
                    VersionSet::Empty
                }
            }
            (VersionSet::Range { .. }, VersionSet::Exact(b)) => {
                if self.contains(b) {
                    other.clone()
                } else {
                    VersionSet::Empty
                }
            }
            (
                VersionSet::Range { lower: a, upper: b },
                VersionSet::Range { lower: c, upper: d },
            ) => VersionSet::range(a.max(c).clone(), b.min(d).clone()),
        }
    }

    /// The smallest representable set containing both sets.
    ///
    /// With a single contiguous region this is the covering range, so the
    /// union of disjoint ranges also admits the versions between them.
    pub fn union(&self, other: &VersionSet) -> VersionSet {
        match (self, other) {
            (VersionSet::Any, _) | (_, VersionSet::Any) => VersionSet::Any,
            (VersionSet::Empty, _) => other.clone(),
            (_, VersionSet::Empty) => self.clone(),
            (VersionSet::Exact(a), VersionSet::Exact(b)) => {
                if a == b {
                    self.clone()
                } else {
                    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                    VersionSet::range(lo.clone(), hi.epsilon_successor())
                }
            }
            (VersionSet::Exact(e), VersionSet::Range { lower, upper })
            | (VersionSet::Range { lower, upper }, VersionSet::Exact(e)) => VersionSet::range(
                lower.min(e).clone(),
                upper.max(&e.epsilon_successor()).clone(),
            ),
            (
                VersionSet::Range { lower: a, upper: b },
                VersionSet::Range { lower: c, upper: d },
            ) => VersionSet::range(a.min(c).clone(), b.max(d).clone()),
        }
    }

    /// `self ∩ ¬other`, or `None` when the result is not a contiguous region.
    ///
    /// When `other` splits `self` in two, the lower remainder is kept. That
    /// asymmetry is observable in learned clauses and diagnostics and is
    /// relied on for deterministic output.
    pub fn intersection_with_inverse(&self, other: &VersionSet) -> Option<VersionSet> {
        match (self, other) {
            (_, VersionSet::Any) => Some(VersionSet::Empty),
            (_, VersionSet::Empty) => Some(self.clone()),
            (VersionSet::Empty, _) => Some(VersionSet::Empty),
            (VersionSet::Any, _) => None,
            (VersionSet::Exact(a), _) => Some(if other.contains(a) {
                VersionSet::Empty
            } else {
                self.clone()
            }),
            (VersionSet::Range { lower, upper }, VersionSet::Exact(e)) => Some(Self::subtract(
                lower,
                upper,
                e,
                &e.epsilon_successor(),
            )),
            (
                VersionSet::Range { lower: a, upper: b },
                VersionSet::Range { lower: c, upper: d },
            ) => Some(Self::subtract(a, b, c, d)),
        }
    }

    /// `[a, b) ∩ ¬[c, d)`, keeping the lower remainder when `[c, d)` lands
    /// strictly inside.
    fn subtract(a: &Version, b: &Version, c: &Version, d: &Version) -> VersionSet {
        if d <= a || c >= b {
            VersionSet::range(a.clone(), b.clone())
        } else if c <= a && d >= b {
            VersionSet::Empty
        } else if c <= a {
            VersionSet::range(d.clone(), b.clone())
        } else {
            VersionSet::range(a.clone(), c.clone())
        }
    }

    /// Whether every version of `other` is in `self`.
    pub fn contains_all(&self, other: &VersionSet) -> bool {
        &self.intersection(other) == other
    }

    /// Whether the two sets share at least one version.
    pub fn contains_any(&self, other: &VersionSet) -> bool {
        self.intersection(other) != VersionSet::Empty
    }
}

impl fmt::Display for VersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSet::Any => f.write_str("any"),
            VersionSet::Empty => f.write_str("empty"),
            VersionSet::Exact(version) => write!(f, "{}", version),
            VersionSet::Range { lower, upper } => {
                if *upper == lower.next_major() {
                    write!(f, "^{}", lower)
                } else {
                    write!(f, "{}..<{}", lower, upper)
                }
            }
        }
    }
}

/// The requirement a dependency places on a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Requirement {
    /// The package must resolve to a version in the set.
    VersionSet(VersionSet),
    /// The package is pinned to a named revision.
    Revision(String),
    /// The package is bound to a local working copy.
    Unversioned,
}

impl Requirement {
    /// Shorthand for a version-set requirement.
    pub fn version_set(set: VersionSet) -> Self {
        Requirement::VersionSet(set)
    }

    /// Shorthand for an exact-version requirement.
    pub fn exact(version: impl Into<Version>) -> Self {
        Requirement::VersionSet(VersionSet::exact(version))
    }

    /// Shorthand for a revision pin.
    pub fn revision(revision: impl Into<String>) -> Self {
        Requirement::Revision(revision.into())
    }

    /// Whether everything admitted by `other` is admitted by `self`.
    ///
    /// Unversioned bindings dominate: they are contained in anything, and
    /// contain nothing but themselves. A revision pin is treated as strictly
    /// stronger than any version set, so version sets contain revisions but
    /// revisions never contain version sets.
    pub fn contains_all(&self, other: &Requirement) -> bool {
        match (self, other) {
            (Requirement::Unversioned, Requirement::Unversioned) => true,
            (Requirement::VersionSet(_), Requirement::Unversioned) => true,
            (Requirement::Revision(_), Requirement::Unversioned) => true,
            (Requirement::Unversioned, Requirement::VersionSet(_)) => false,
            (Requirement::Unversioned, Requirement::Revision(_)) => false,
            (Requirement::Revision(a), Requirement::Revision(b)) => a == b,
            (Requirement::Revision(_), Requirement::VersionSet(_)) => false,
            (Requirement::VersionSet(_), Requirement::Revision(_)) => true,
            (Requirement::VersionSet(a), Requirement::VersionSet(b)) => a.contains_all(b),
        }
    }

    /// Whether `self` and `other` admit anything in common, under the same
    /// dominance rules as [`Requirement::contains_all`].
    pub fn contains_any(&self, other: &Requirement) -> bool {
        match (self, other) {
            (Requirement::Unversioned, Requirement::Unversioned) => true,
            (Requirement::VersionSet(_), Requirement::Unversioned) => true,
            (Requirement::Revision(_), Requirement::Unversioned) => true,
            (Requirement::Unversioned, Requirement::VersionSet(_)) => false,
            (Requirement::Unversioned, Requirement::Revision(_)) => false,
            (Requirement::Revision(a), Requirement::Revision(b)) => a == b,
            (Requirement::Revision(_), Requirement::VersionSet(_)) => false,
            (Requirement::VersionSet(_), Requirement::Revision(_)) => true,
            (Requirement::VersionSet(a), Requirement::VersionSet(b)) => a.contains_any(b),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::VersionSet(set) => write!(f, "{}", set),
            Requirement::Revision(revision) => write!(f, "@{}", revision),
            Requirement::Unversioned => f.write_str("unversioned"),
        }
    }
}

/// The binding a package resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundVersion {
    /// A concrete tagged version.
    Version(Version),
    /// A named revision.
    Revision(String),
    /// A local working copy.
    Unversioned,
    /// Excluded from the dependency graph. Other resolution strategies can
    /// produce this binding; this solver never does, and treats observing it
    /// as an internal invariant violation.
    Excluded,
}

impl BoundVersion {
    /// The requirement a decision on this binding asserts: always concrete,
    /// never a range.
    pub(crate) fn as_requirement(&self) -> Requirement {
        match self {
            BoundVersion::Version(version) => Requirement::exact(version.clone()),
            BoundVersion::Revision(revision) => Requirement::Revision(revision.clone()),
            BoundVersion::Unversioned => Requirement::Unversioned,
            BoundVersion::Excluded => {
                unreachable!("excluded bindings never enter the solution")
            }
        }
    }
}

impl fmt::Display for BoundVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundVersion::Version(version) => write!(f, "{}", version),
            BoundVersion::Revision(revision) => write!(f, "{}", revision),
            BoundVersion::Unversioned => f.write_str("unversioned"),
            BoundVersion::Excluded => f.write_str("excluded"),
        }
    }
}
