// SPDX-License-Identifier: MPL-2.0

//! An incompatibility is a set of terms for different packages
//! that should never be satisfied all together.

use std::fmt;

use crate::internal::{Arena, Id};
use crate::{PackageReference, Requirement, SetRelation, Term};

/// An incompatibility is a set of terms that should never be satisfied all
/// together.
///
/// An incompatibility usually originates from a package dependency. For
/// example, if package A at version 1 depends on package B in `^2`, then the
/// set `{ A 1, not B ^2 }` is an incompatibility: a solution holding both "A
/// is at 1" and "B is not in ^2" contradicts that dependency.
///
/// Incompatibilities are also derived from two other incompatibilities during
/// conflict resolution; those carry back-pointers to both parents, which
/// together form the derivation graph walked for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Incompatibility {
    /// Normalized terms: insertion-ordered, at most one per package.
    terms: Vec<Term>,
    /// The reason for the incompatibility.
    pub(crate) cause: Cause,
}

/// Type alias of unique identifiers for incompatibilities.
pub(crate) type IncompId = Id<Incompatibility>;

/// The reason for an incompatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Cause {
    /// Seeded at the start of a solve to force picking the root package.
    Root,
    /// Encodes a dependency: the named package, in the region of its first
    /// term, requires the package of its second term.
    Dependency { package: PackageReference },
    /// Nothing the container offers satisfies the term.
    NoAvailableVersion,
    /// Learned during conflict resolution from two parent incompatibilities.
    Conflict { conflict: IncompId, other: IncompId },
}

/// How the terms of an incompatibility stand against a partial solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Relation {
    /// Every term is satisfied: the incompatibility is violated.
    Satisfied,
    /// Every term but the one at this index is satisfied; unit propagation
    /// can force that term's inverse.
    AlmostSatisfied(usize),
    /// The term at this index is contradicted, so the incompatibility cannot
    /// fire.
    Contradicted(usize),
    /// Two or more terms are undetermined.
    Inconclusive,
}

impl Incompatibility {
    /// Build and normalize an incompatibility.
    ///
    /// Duplicated terms collapse first. A learned clause that still mentions
    /// the root package positively drops those terms when anything else
    /// remains: the root is decided unconditionally, so they carry no
    /// information. Remaining terms are then merged per package by
    /// intersection. A same-package intersection that fails, or an empty
    /// normalized set, indicates a malformed clause upstream and panics.
    pub(crate) fn new(terms: Vec<Term>, cause: Cause) -> Self {
        let mut terms = ordered_dedup(terms);
        if terms.len() > 1
            && matches!(cause, Cause::Conflict { .. })
            && terms.iter().any(|t| t.positive && t.package.is_root())
        {
            terms.retain(|t| !(t.positive && t.package.is_root()));
        }
        let terms = normalize(terms);
        assert!(
            !terms.is_empty(),
            "incompatibility normalized to nothing: {:?}",
            cause
        );
        Self { terms, cause }
    }

    /// The initial incompatibility forcing the root package to be picked.
    pub(crate) fn root(root: PackageReference, root_requirement: Requirement) -> Self {
        Self {
            terms: vec![Term::negative(root, root_requirement)],
            cause: Cause::Root,
        }
    }

    /// The incompatibility encoding "`depender` requires `dependee`".
    pub(crate) fn dependency(depender: Term, dependee: Term) -> Self {
        debug_assert!(depender.positive && !dependee.positive);
        let package = depender.package.clone();
        let terms = if depender.package == dependee.package {
            vec![depender]
        } else {
            vec![depender, dependee]
        };
        Self {
            terms,
            cause: Cause::Dependency { package },
        }
    }

    /// Remember that no available version satisfies the term.
    pub(crate) fn no_available_version(term: Term) -> Self {
        debug_assert!(term.positive, "only positive terms can lack versions");
        Self {
            terms: vec![term],
            cause: Cause::NoAvailableVersion,
        }
    }

    /// Resolve this incompatibility against the cause of its most recent
    /// satisfier, producing the learned clause.
    ///
    /// The rewritten clause keeps every term of `incompat` except the
    /// resolved one, adds every term of `satisfier_cause` not about the
    /// resolved package, and — when the satisfier only partially satisfied
    /// the resolved term — re-adds the unsatisfied remainder as its inverse.
    pub(crate) fn prior_cause(
        incompat: IncompId,
        satisfier_cause: IncompId,
        resolved_term: &Term,
        difference: Option<&Term>,
        store: &Arena<Incompatibility>,
    ) -> Self {
        let mut terms: Vec<Term> = store[incompat]
            .terms
            .iter()
            .filter(|t| *t != resolved_term)
            .cloned()
            .collect();
        terms.extend(
            store[satisfier_cause]
                .terms
                .iter()
                .filter(|t| t.package != resolved_term.package)
                .cloned(),
        );
        if let Some(difference) = difference {
            terms.push(difference.inverse());
        }
        Self::new(
            terms,
            Cause::Conflict {
                conflict: incompat,
                other: satisfier_cause,
            },
        )
    }

    /// Whether this incompatibility proves the whole solve impossible.
    pub(crate) fn is_failure(&self) -> bool {
        self.terms.is_empty() || (self.terms.len() == 1 && self.terms[0].package.is_root())
    }

    pub(crate) fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// The term about the given package, if present.
    pub(crate) fn get(&self, package: &PackageReference) -> Option<&Term> {
        self.terms.iter().find(|t| &t.package == package)
    }

    /// Parent causes, if this clause was learned during conflict resolution.
    pub(crate) fn causes(&self) -> Option<(IncompId, IncompId)> {
        match self.cause {
            Cause::Conflict { conflict, other } => Some((conflict, other)),
            Cause::Root | Cause::Dependency { .. } | Cause::NoAvailableVersion => None,
        }
    }

    /// Classify the terms against the statement the solution makes about
    /// each of them.
    pub(crate) fn relation<F>(&self, mut statement: F) -> Relation
    where
        F: FnMut(&Term) -> SetRelation,
    {
        let mut unsatisfied = None;
        for (index, term) in self.terms.iter().enumerate() {
            match statement(term) {
                SetRelation::Disjoint => return Relation::Contradicted(index),
                SetRelation::Subset => {}
                SetRelation::Overlap => {
                    if unsatisfied.is_some() {
                        return Relation::Inconclusive;
                    }
                    unsatisfied = Some(index);
                }
            }
        }
        match unsatisfied {
            Some(index) => Relation::AlmostSatisfied(index),
            None => Relation::Satisfied,
        }
    }
}

fn ordered_dedup(terms: Vec<Term>) -> Vec<Term> {
    let mut unique: Vec<Term> = Vec::with_capacity(terms.len());
    for term in terms {
        if !unique.contains(&term) {
            unique.push(term);
        }
    }
    unique
}

/// Merge same-package terms by intersection, keeping first-seen order.
fn normalize(terms: Vec<Term>) -> Vec<Term> {
    let mut merged: Vec<Term> = Vec::with_capacity(terms.len());
    for term in terms {
        match merged.iter_mut().find(|t| t.package == term.package) {
            None => merged.push(term),
            Some(existing) => {
                *existing = existing.intersect(&term).unwrap_or_else(|| {
                    panic!(
                        "vacuous incompatibility: {} has no intersection with {}",
                        existing, term
                    )
                });
            }
        }
    }
    merged
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.terms.as_slice() {
            [] => f.write_str("version solving failed"),
            [term] if term.positive => write!(f, "{} is forbidden", term),
            [term] => write!(f, "{} is mandatory", term.inverse()),
            [depender, dependee] if depender.positive && !dependee.positive => {
                write!(f, "{} depends on {}", depender, dependee.inverse())
            }
            terms => {
                let rendered: Vec<String> = terms.iter().map(ToString::to_string).collect();
                write!(f, "{} are incompatible", rendered.join(", "))
            }
        }
    }
}
