// SPDX-License-Identifier: MPL-2.0

//! A term is the fundamental unit of operation of the solver.
//! It is a positive or negative statement about the versions a package may
//! take.

use std::fmt;

use crate::{PackageReference, Requirement, VersionSet};

/// A positive or negative statement about a package.
///
/// `positive` asserts "the package resolves to something the requirement
/// admits"; its negation allows anything outside the requirement, including
/// not selecting the package at all. Terms about different packages do not
/// interact; all binary operations below require matching packages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Term {
    /// The package the statement is about.
    pub package: PackageReference,
    /// The requirement the statement ranges over.
    pub requirement: Requirement,
    /// Polarity of the statement.
    pub positive: bool,
}

/// How a term relates to another statement about the same package.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetRelation {
    /// Whenever `self` holds, the other term holds too.
    Subset,
    /// The two statements can hold together but neither implies the other.
    Overlap,
    /// The two statements can never hold together.
    Disjoint,
}

impl Term {
    /// A positive term.
    pub fn positive(package: PackageReference, requirement: Requirement) -> Self {
        Self {
            package,
            requirement,
            positive: true,
        }
    }

    /// A negative term.
    pub fn negative(package: PackageReference, requirement: Requirement) -> Self {
        Self {
            package,
            requirement,
            positive: false,
        }
    }

    /// The same statement with opposite polarity.
    pub fn inverse(&self) -> Self {
        Self {
            package: self.package.clone(),
            requirement: self.requirement.clone(),
            positive: !self.positive,
        }
    }

    /// The conjunction of two terms about the same package, or `None` when
    /// they are mutually exclusive or the combination is not representable
    /// (for example two distinct revision pins).
    pub fn intersect(&self, other: &Term) -> Option<Term> {
        debug_assert_eq!(
            self.package, other.package,
            "terms about different packages do not intersect"
        );
        if self.package != other.package {
            return None;
        }
        match (&self.requirement, &other.requirement) {
            (Requirement::VersionSet(lhs), Requirement::VersionSet(rhs)) => {
                let (set, positive) = match (self.positive, other.positive) {
                    (true, true) => (lhs.intersection(rhs), true),
                    (true, false) => (lhs.intersection_with_inverse(rhs)?, true),
                    (false, true) => (rhs.intersection_with_inverse(lhs)?, true),
                    (false, false) => {
                        // Negated statements conjoin to the negation of a
                        // union; with contiguous sets that union is only
                        // faithful for range/range, everything else falls
                        // back to the intersection.
                        let set = match (lhs, rhs) {
                            (VersionSet::Range { .. }, VersionSet::Range { .. }) => lhs.union(rhs),
                            _ => lhs.intersection(rhs),
                        };
                        (set, false)
                    }
                };
                if set == VersionSet::Empty {
                    return None;
                }
                Some(Term {
                    package: self.package.clone(),
                    requirement: Requirement::VersionSet(set),
                    positive,
                })
            }
            (Requirement::Unversioned, Requirement::Unversioned) => {
                (self.positive == other.positive).then(|| self.clone())
            }
            (Requirement::Revision(lhs), Requirement::Revision(rhs)) => {
                (self.positive == other.positive && lhs == rhs).then(|| self.clone())
            }
            // A positive revision pin absorbs any version-set statement,
            // whichever side it appears on.
            (Requirement::Revision(_), Requirement::VersionSet(_)) => {
                self.positive.then(|| self.clone())
            }
            (Requirement::VersionSet(_), Requirement::Revision(_)) => {
                other.positive.then(|| other.clone())
            }
            (Requirement::Unversioned, Requirement::VersionSet(_)) => None,
            (Requirement::Unversioned, Requirement::Revision(_)) => None,
            (Requirement::VersionSet(_), Requirement::Unversioned) => None,
            (Requirement::Revision(_), Requirement::Unversioned) => None,
        }
    }

    /// `self ∩ ¬other`.
    pub fn difference(&self, other: &Term) -> Option<Term> {
        self.intersect(&other.inverse())
    }

    /// How this term relates to another statement about the same package.
    pub fn relation(&self, other: &Term) -> SetRelation {
        debug_assert_eq!(
            self.package, other.package,
            "terms about different packages are unrelated"
        );
        match (self.positive, other.positive) {
            (true, true) => {
                if other.requirement.contains_all(&self.requirement) {
                    SetRelation::Subset
                } else if self.requirement.contains_any(&other.requirement) {
                    SetRelation::Overlap
                } else {
                    SetRelation::Disjoint
                }
            }
            (false, true) => {
                if self.requirement.contains_all(&other.requirement) {
                    SetRelation::Disjoint
                } else {
                    SetRelation::Overlap
                }
            }
            (true, false) => {
                if !other.requirement.contains_any(&self.requirement) {
                    SetRelation::Subset
                } else if other.requirement.contains_all(&self.requirement) {
                    SetRelation::Disjoint
                } else {
                    SetRelation::Overlap
                }
            }
            (false, false) => {
                if self.requirement.contains_all(&other.requirement) {
                    SetRelation::Subset
                } else {
                    SetRelation::Overlap
                }
            }
        }
    }

    /// Whether this term being true forces `other` to be true.
    pub fn satisfies(&self, other: &Term) -> bool {
        self.package == other.package && self.relation(other) == SetRelation::Subset
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.positive {
            write!(f, "¬")?;
        }
        write!(f, "{} {}", self.package, self.requirement)
    }
}
