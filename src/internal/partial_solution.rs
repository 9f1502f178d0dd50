// SPDX-License-Identifier: MPL-2.0

//! The partial solution is the solver's working memory: an historically
//! ordered log of assignments, together with per-package caches of what the
//! log adds up to.

use std::fmt;
use std::hash::BuildHasherDefault;

use log::debug;
use rustc_hash::FxHasher;

use crate::internal::IncompId;
use crate::{BoundVersion, Map, PackageReference, SetRelation, Term};

type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// One entry of the assignment log.
///
/// A decision commits a package to a concrete binding; a derivation records a
/// term forced by unit propagation and points back at the incompatibility
/// that forced it.
#[derive(Debug, Clone)]
pub(crate) struct Assignment {
    pub(crate) term: Term,
    pub(crate) decision_level: usize,
    /// The forcing incompatibility for derivations, `None` for decisions.
    pub(crate) cause: Option<IncompId>,
}

impl Assignment {
    pub(crate) fn is_decision(&self) -> bool {
        self.cause.is_none()
    }
}

/// All assignments made so far, historically ordered.
///
/// The log is the source of truth; `positive`, `negative` and `decisions`
/// are caches reconstructible by replaying it. For any package at most one
/// of `positive` and `negative` is populated: the positive entry is the
/// intersection of every statement seen about the package once some
/// statement requires it, the negative entry accumulates exclusions for
/// packages nothing requires yet.
pub(crate) struct PartialSolution {
    assignments: Vec<Assignment>,
    positive: FxIndexMap<PackageReference, Term>,
    negative: Map<PackageReference, Term>,
    decisions: Map<PackageReference, BoundVersion>,
}

impl PartialSolution {
    pub(crate) fn new() -> Self {
        Self {
            assignments: Vec::new(),
            positive: FxIndexMap::default(),
            negative: Map::default(),
            decisions: Map::default(),
        }
    }

    /// The current decision level: the root decision is level 0.
    pub(crate) fn decision_level(&self) -> usize {
        self.decisions.len().saturating_sub(1)
    }

    pub(crate) fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub(crate) fn has_decision(&self, package: &PackageReference) -> bool {
        self.decisions.contains_key(package)
    }

    /// The accumulated statement about a package, if any statement requires
    /// it.
    pub(crate) fn positive_term(&self, package: &PackageReference) -> Option<&Term> {
        self.positive.get(package)
    }

    /// The first package some statement requires but no decision binds yet,
    /// in the order packages were first required.
    pub(crate) fn first_undecided(&self) -> Option<&Term> {
        self.positive
            .values()
            .find(|term| !self.decisions.contains_key(&term.package))
    }

    /// Append a derivation forced by `cause`.
    pub(crate) fn derive(&mut self, term: Term, cause: IncompId) {
        let assignment = Assignment {
            term,
            decision_level: self.decision_level(),
            cause: Some(cause),
        };
        Self::register(&mut self.positive, &mut self.negative, &assignment.term);
        self.assignments.push(assignment);
    }

    /// Commit a package to a binding, opening the next decision level.
    pub(crate) fn decide(&mut self, package: PackageReference, bound: BoundVersion) {
        debug_assert!(
            !self.decisions.contains_key(&package),
            "{} already decided",
            package
        );
        let term = Term::positive(package.clone(), bound.as_requirement());
        self.decisions.insert(package, bound);
        let assignment = Assignment {
            term,
            decision_level: self.decision_level(),
            cause: None,
        };
        Self::register(&mut self.positive, &mut self.negative, &assignment.term);
        self.assignments.push(assignment);
    }

    /// Fold one statement into the caches.
    ///
    /// An intersection that is not representable keeps the newest statement
    /// rather than discarding what is known about the package, the same
    /// fallback the satisfier accumulation below uses.
    fn register(
        positive: &mut FxIndexMap<PackageReference, Term>,
        negative: &mut Map<PackageReference, Term>,
        term: &Term,
    ) {
        let package = &term.package;
        if let Some(existing) = positive.get_mut(package) {
            *existing = existing.intersect(term).unwrap_or_else(|| term.clone());
            return;
        }
        let combined = match negative.get(package) {
            None => term.clone(),
            Some(excluded) => term.intersect(excluded).unwrap_or_else(|| term.clone()),
        };
        if combined.positive {
            negative.remove(package);
            positive.insert(package.clone(), combined);
        } else {
            negative.insert(package.clone(), combined);
        }
    }

    /// How the solution stands with respect to a statement. A package the
    /// log says nothing about is undetermined, not satisfied.
    pub(crate) fn relation(&self, term: &Term) -> SetRelation {
        if let Some(positive) = self.positive.get(&term.package) {
            positive.relation(term)
        } else if let Some(negative) = self.negative.get(&term.package) {
            negative.relation(term)
        } else {
            SetRelation::Overlap
        }
    }

    pub(crate) fn satisfies(&self, term: &Term) -> bool {
        self.relation(term) == SetRelation::Subset
    }

    /// The position of the earliest assignment after which the accumulated
    /// statements about the term's package pin it inside `term`.
    ///
    /// Must exist for every term the solution satisfies; anything else is a
    /// broken solver invariant.
    pub(crate) fn satisfier(&self, term: &Term) -> usize {
        let mut running: Option<Term> = None;
        for (index, assignment) in self.assignments.iter().enumerate() {
            if assignment.term.package != term.package {
                continue;
            }
            // An unrepresentable intersection restarts the accumulation
            // from this assignment, mirroring the cache registration above.
            let accumulated = match &running {
                None => assignment.term.clone(),
                Some(previous) => previous
                    .intersect(&assignment.term)
                    .unwrap_or_else(|| assignment.term.clone()),
            };
            if accumulated.satisfies(term) {
                return index;
            }
            running = Some(accumulated);
        }
        unreachable!("no assignment satisfies {}", term)
    }

    /// Drop every assignment above `level` and rebuild the caches by
    /// replaying the remainder of the log.
    pub(crate) fn backtrack(&mut self, level: usize) {
        debug!("backtracking to decision level {}", level);
        while let Some(last) = self.assignments.last() {
            if last.decision_level <= level {
                break;
            }
            let dropped = self.assignments.pop().expect("just observed");
            if dropped.is_decision() {
                self.decisions.remove(&dropped.term.package);
            }
        }
        self.positive.clear();
        self.negative.clear();
        for assignment in &self.assignments {
            Self::register(&mut self.positive, &mut self.negative, &assignment.term);
        }
    }
}

impl fmt::Display for PartialSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "decision level {}", self.decision_level())?;
        for assignment in &self.assignments {
            writeln!(
                f,
                "  [{}] {} {}",
                assignment.decision_level,
                if assignment.is_decision() {
                    "decision  "
                } else {
                    "derivation"
                },
                assignment.term
            )?;
        }
        Ok(())
    }
}
