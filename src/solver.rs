// SPDX-License-Identifier: MPL-2.0

//! The PubGrub version solving algorithm.
//!
//! Given a set of top-level constraints, the solver finds a binding for
//! every transitively required package that satisfies all dependency
//! constraints, or proves that none exists and explains why in plain
//! English.
//!
//! The algorithm alternates unit propagation with decision making over a
//! growing store of incompatibilities. A conflict found during propagation
//! enters conflict resolution, which learns a new incompatibility by the
//! rule of resolution and jumps back to the decision level where that clause
//! becomes useful. See the [PubGrub documentation](
//! https://github.com/dart-lang/pub/blob/master/doc/solver.md) for the
//! algorithm's background.

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};

use crate::gateway::ContainerGateway;
use crate::internal::{Arena, IncompId, Incompatibility, PartialSolution, Relation};
use crate::report;
use crate::trace::{FileSink, StepKind, StepLocation, StreamSink, TraceSink, TraceStep};
use crate::{
    BoundVersion, Constraint, Container, ContainerProvider, Map, PackageReference, ProviderError,
    Requirement, SolveError, Solution, Term, Version, VersionSet,
};

/// Construction options for a [`Solver`].
pub struct SolverOptions {
    /// Start background fetches for packages as soon as they are mentioned
    /// by a constraint, instead of fetching on first use.
    pub is_prefetching_enabled: bool,
    /// Ask the container provider not to refresh already cloned
    /// repositories.
    pub skip_update: bool,
    /// Confine the solve to containers that are already in the gateway
    /// cache; exactly pinned constraints that cannot be satisfied from the
    /// cache fail upfront with [`SolveError::MissingVersions`].
    pub only_use_fetched_containers: bool,
    /// Write a newline-terminated record per solver action to this file,
    /// opened lazily and flushed per record.
    pub trace_file: Option<PathBuf>,
    /// Write the same records to an arbitrary stream.
    pub trace_stream: Option<Box<dyn Write + Send>>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            is_prefetching_enabled: false,
            skip_update: false,
            only_use_fetched_containers: false,
            trace_file: None,
            trace_stream: None,
        }
    }
}

/// The version solver.
///
/// A solver owns its container gateway and trace sinks; the per-solve state
/// is reset on every [`Solver::solve`] call, so the same containers serve
/// repeated solves.
pub struct Solver<P: ContainerProvider> {
    root: PackageReference,
    gateway: ContainerGateway<P>,
    is_prefetching_enabled: bool,
    only_use_fetched_containers: bool,
    sinks: Vec<Box<dyn TraceSink>>,

    store: Arena<Incompatibility>,
    incompatibilities: Map<PackageReference, Vec<IncompId>>,
    solution: PartialSolution,
}

impl<P: ContainerProvider> Solver<P> {
    /// A solver with default options.
    pub fn new(provider: Arc<P>) -> Self {
        Self::with_options(provider, SolverOptions::default())
    }

    /// A solver with explicit options.
    pub fn with_options(provider: Arc<P>, options: SolverOptions) -> Self {
        let mut sinks: Vec<Box<dyn TraceSink>> = Vec::new();
        if let Some(path) = options.trace_file {
            sinks.push(Box::new(FileSink::new(path)));
        }
        if let Some(stream) = options.trace_stream {
            sinks.push(Box::new(StreamSink::new(stream)));
        }
        Self {
            root: PackageReference::root(),
            gateway: ContainerGateway::new(provider, options.skip_update),
            is_prefetching_enabled: options.is_prefetching_enabled,
            only_use_fetched_containers: options.only_use_fetched_containers,
            sinks,
            store: Arena::new(),
            incompatibilities: Map::default(),
            solution: PartialSolution::new(),
        }
    }

    /// Attach an additional trace sink.
    pub fn add_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sinks.push(sink);
    }

    /// Start fetching containers in the background. A pure optimization:
    /// results land in the same cache `solve` reads from.
    pub fn prefetch(&self, packages: impl IntoIterator<Item = PackageReference>) {
        self.gateway.prefetch(packages);
    }

    /// Find a binding for every package transitively required by
    /// `dependencies`, or explain why none exists.
    ///
    /// `pins` are applied ahead of `dependencies`; preference between
    /// overlapping constraints is purely positional, earlier entries win
    /// where both cannot hold.
    pub fn solve(
        &mut self,
        dependencies: &[Constraint],
        pins: &[Constraint],
    ) -> Result<Solution, SolveError> {
        self.store = Arena::new();
        self.incompatibilities = Map::default();
        self.solution = PartialSolution::new();

        let inputs: Vec<Constraint> = pins.iter().chain(dependencies.iter()).cloned().collect();
        if self.only_use_fetched_containers {
            self.require_pinned_versions_fetched(&inputs)?;
        }
        if self.is_prefetching_enabled {
            self.gateway
                .prefetch(inputs.iter().map(|constraint| constraint.package.clone()));
        }

        let root_requirement = Requirement::exact(Version::one());
        self.add_incompatibility(
            Incompatibility::root(self.root.clone(), root_requirement.clone()),
            StepLocation::TopLevel,
        );
        let root_term = Term::positive(self.root.clone(), root_requirement);
        // Unit propagation visits a package's incompatibilities newest
        // first, so the top-level constraints go in back to front: the
        // first-listed constraint is the first one propagated.
        for constraint in inputs.iter().rev() {
            let dependee = Term::negative(
                constraint.package.clone(),
                constraint.requirement.clone(),
            );
            self.add_incompatibility(
                Incompatibility::dependency(root_term.clone(), dependee),
                StepLocation::TopLevel,
            );
        }

        let root = self.root.clone();
        self.trace_decision(&root, &BoundVersion::Version(Version::one()), StepLocation::TopLevel);
        self.solution
            .decide(root, BoundVersion::Version(Version::one()));

        let mut next = self.root.clone();
        loop {
            info!("unit propagation for {}", next);
            self.propagate(next)?;
            debug!("partial solution after propagation:\n{}", self.solution);
            match self.make_decision()? {
                Some(package) => next = package,
                None => break,
            }
        }
        self.extract_solution()
    }

    /// Run unit propagation from a package whose statements changed.
    fn propagate(&mut self, package: PackageReference) -> Result<(), SolveError> {
        let mut changed = VecDeque::from([package]);
        while let Some(package) = changed.pop_front() {
            let candidates = self.positive_incompatibilities(&package);
            'candidates: for &id in candidates.iter().rev() {
                let relation = self.store[id].relation(|t| self.solution.relation(t));
                match relation {
                    Relation::Satisfied => {
                        let root_cause = self.resolve_conflict(id)?;
                        // The learned clause must force exactly one term
                        // once the solution has been backtracked.
                        let relation =
                            self.store[root_cause].relation(|t| self.solution.relation(t));
                        let Relation::AlmostSatisfied(index) = relation else {
                            unreachable!(
                                "conflict resolution did not leave an almost-satisfied clause"
                            )
                        };
                        let term = self.store[root_cause].terms()[index].clone();
                        self.trace_derivation(&term.inverse(), root_cause, StepLocation::ConflictResolution);
                        self.solution.derive(term.inverse(), root_cause);
                        changed.clear();
                        changed.push_back(term.package);
                        break 'candidates;
                    }
                    Relation::AlmostSatisfied(index) => {
                        let term = self.store[id].terms()[index].clone();
                        let inverse = term.inverse();
                        self.trace_derivation(&inverse, id, StepLocation::UnitPropagation);
                        self.solution.derive(inverse, id);
                        if !changed.contains(&term.package) {
                            changed.push_back(term.package);
                        }
                    }
                    Relation::Contradicted(index) => {
                        debug!(
                            "{} cannot fire, {} is ruled out",
                            self.store[id], self.store[id].terms()[index]
                        );
                    }
                    Relation::Inconclusive => {}
                }
            }
        }
        Ok(())
    }

    /// Conflict-driven clause learning with backjumping.
    ///
    /// Rewrites the conflicting incompatibility against the cause of its
    /// most recent satisfier until the clause either proves the solve
    /// impossible or can be made useful again by backtracking.
    fn resolve_conflict(&mut self, conflicting: IncompId) -> Result<IncompId, SolveError> {
        info!("conflict: {}", self.store[conflicting]);
        let mut incompat = conflicting;
        let mut created = false;
        loop {
            if self.store[incompat].is_failure() {
                let diagnostic = report::render(incompat, &self.store);
                return Err(SolveError::Unresolvable { diagnostic });
            }

            let mut resolved_term: Option<Term> = None;
            let mut satisfier_index: Option<usize> = None;
            let mut difference: Option<Term> = None;
            let mut previous_level = 0;
            for term in self.store[incompat].terms() {
                let candidate = self.solution.satisfier(term);
                match satisfier_index {
                    None => {
                        resolved_term = Some(term.clone());
                        satisfier_index = Some(candidate);
                    }
                    Some(current) if current < candidate => {
                        previous_level = previous_level
                            .max(self.solution.assignments()[current].decision_level);
                        resolved_term = Some(term.clone());
                        satisfier_index = Some(candidate);
                        difference = None;
                    }
                    Some(_) => {
                        previous_level = previous_level
                            .max(self.solution.assignments()[candidate].decision_level);
                    }
                }
                if resolved_term.as_ref() == Some(term) {
                    // When the satisfier only partially satisfies the term,
                    // the assignment pinning down the rest also bounds how
                    // far we may jump back. Full satisfaction leaves no
                    // remainder; checking it through the relation keeps a
                    // dominant revision pin from reading as one.
                    let satisfier_term =
                        &self.solution.assignments()[satisfier_index.expect("just set")].term;
                    difference = if satisfier_term.satisfies(term) {
                        None
                    } else {
                        satisfier_term.difference(term)
                    };
                    if let Some(difference) = &difference {
                        let also = self.solution.satisfier(&difference.inverse());
                        previous_level = previous_level
                            .max(self.solution.assignments()[also].decision_level);
                    }
                }
            }

            let satisfier_index = satisfier_index.expect("a conflict has terms");
            let resolved_term = resolved_term.expect("a conflict has terms");
            let satisfier = &self.solution.assignments()[satisfier_index];
            let satisfier_level = satisfier.decision_level;
            let satisfier_cause = satisfier.cause;
            let satisfier_rendering = satisfier.term.to_string();

            if previous_level < satisfier_level || satisfier_cause.is_none() {
                info!(
                    "backjumping to level {} with {}",
                    previous_level, self.store[incompat]
                );
                self.solution.backtrack(previous_level);
                if created {
                    self.index_incompatibility(incompat, StepLocation::ConflictResolution);
                }
                return Ok(incompat);
            }

            let cause = satisfier_cause.expect("derivations carry their cause");
            self.emit(TraceStep::ConflictResolution {
                incompatibility: self.store[incompat].to_string(),
                term: resolved_term.to_string(),
                satisfier: satisfier_rendering,
            });
            let prior = Incompatibility::prior_cause(
                incompat,
                cause,
                &resolved_term,
                difference.as_ref(),
                &self.store,
            );
            incompat = self.store.alloc(prior);
            created = true;
        }
    }

    /// Pick the next undecided package and try to bind it.
    ///
    /// Returns the package looked at, or `None` once nothing is undecided
    /// and the solve is complete.
    fn make_decision(&mut self) -> Result<Option<PackageReference>, SolveError> {
        let Some(package) = self
            .solution
            .first_undecided()
            .map(|term| term.package.clone())
        else {
            return Ok(None);
        };
        debug_assert!(!self.solution.has_decision(&package));
        let term = self
            .solution
            .positive_term(&package)
            .cloned()
            .expect("undecided packages carry a positive term");
        let container = self.fetch(&package)?;

        let Some(bound) = Self::best_available_bound(container.as_ref(), &term) else {
            info!("no versions of {} match {}", package, term.requirement);
            self.add_incompatibility(
                Incompatibility::no_available_version(term),
                StepLocation::DecisionMaking,
            );
            return Ok(Some(package));
        };

        let dependency_incompatibilities =
            self.dependency_incompatibilities(&package, &bound, container.as_ref())?;
        let mut would_conflict = false;
        for incompatibility in dependency_incompatibilities {
            let id = self.add_incompatibility(incompatibility, StepLocation::DecisionMaking);
            // If everything but this package's own term is already
            // satisfied, committing the decision would complete the
            // violation; leave it to propagation instead.
            would_conflict = would_conflict
                || self.store[id]
                    .terms()
                    .iter()
                    .all(|t| t.package == package || self.solution.satisfies(t));
        }

        if would_conflict {
            info!("holding back decision {} @ {}", package, bound);
        } else {
            info!("deciding {} @ {}", package, bound);
            self.trace_decision(&package, &bound, StepLocation::DecisionMaking);
            self.solution.decide(package.clone(), bound);
        }
        Ok(Some(package))
    }

    /// The best binding the container offers for a positive term: the
    /// highest version inside a version set, or the pin itself for revision
    /// and local requirements.
    fn best_available_bound(container: &dyn Container, term: &Term) -> Option<BoundVersion> {
        debug_assert!(term.positive, "decisions are made for required packages");
        match &term.requirement {
            Requirement::VersionSet(set) => container
                .versions(&|version| set.contains(version))
                .into_iter()
                .next()
                .map(BoundVersion::Version),
            Requirement::Revision(revision) => Some(BoundVersion::Revision(revision.clone())),
            Requirement::Unversioned => Some(BoundVersion::Unversioned),
        }
    }

    /// The incompatibilities encoding the dependencies of `package` at
    /// `bound`.
    fn dependency_incompatibilities(
        &mut self,
        package: &PackageReference,
        bound: &BoundVersion,
        container: &dyn Container,
    ) -> Result<Vec<Incompatibility>, SolveError> {
        let (self_requirement, constraints) = match bound {
            BoundVersion::Version(version) => {
                let constraints = container.dependencies(version)?;
                let revisions: Vec<(PackageReference, String)> = constraints
                    .iter()
                    .filter_map(|constraint| match &constraint.requirement {
                        Requirement::Revision(revision) => {
                            Some((constraint.package.clone(), revision.clone()))
                        }
                        Requirement::VersionSet(_) | Requirement::Unversioned => None,
                    })
                    .collect();
                if !revisions.is_empty() {
                    return Err(SolveError::IncompatibleConstraints {
                        dependency: Constraint::new(
                            package.clone(),
                            Requirement::exact(version.clone()),
                        ),
                        revisions,
                    });
                }
                // The upper bound assumes dependencies stay stable across a
                // major release line; when they do not, diagnostics name a
                // wider version region than strictly involved.
                let region = VersionSet::range(version.clone(), version.next_major());
                (Requirement::VersionSet(region), constraints)
            }
            BoundVersion::Revision(revision) => {
                self.require_acyclic_revisions(package, revision)?;
                (
                    Requirement::Revision(revision.clone()),
                    container.revision_dependencies(revision)?,
                )
            }
            BoundVersion::Unversioned => (
                Requirement::Unversioned,
                container.unversioned_dependencies()?,
            ),
            BoundVersion::Excluded => {
                unreachable!("excluded bindings never reach dependency expansion")
            }
        };

        if self.is_prefetching_enabled {
            self.gateway.prefetch(
                constraints
                    .iter()
                    .map(|constraint| constraint.package.clone()),
            );
        }

        Ok(constraints
            .into_iter()
            .filter(|constraint| constraint.package != *package)
            .map(|constraint| {
                Incompatibility::dependency(
                    Term::positive(package.clone(), self_requirement.clone()),
                    Term::negative(constraint.package, constraint.requirement),
                )
            })
            .collect())
    }

    /// Walk the revision-requirement closure of `(package, revision)` and
    /// fail if it leads back to `package`.
    fn require_acyclic_revisions(
        &self,
        package: &PackageReference,
        revision: &str,
    ) -> Result<(), SolveError> {
        let mut visited: crate::Set<PackageReference> = crate::Set::default();
        visited.insert(package.clone());
        let mut pending = vec![(package.clone(), revision.to_string())];
        while let Some((current, revision)) = pending.pop() {
            let container = self.fetch(&current)?;
            for constraint in container.revision_dependencies(&revision)? {
                let Requirement::Revision(dependency_revision) = &constraint.requirement else {
                    continue;
                };
                if constraint.package == *package {
                    return Err(SolveError::Cycle(package.clone()));
                }
                if visited.insert(constraint.package.clone()) {
                    pending.push((constraint.package, dependency_revision.clone()));
                }
            }
        }
        Ok(())
    }

    /// Collect the bindings of a completed solve, asking each container for
    /// its canonical identifier.
    fn extract_solution(&self) -> Result<Solution, SolveError> {
        let mut bindings = Solution::new();
        for assignment in self.solution.assignments() {
            if !assignment.is_decision() || assignment.term.package.is_root() {
                continue;
            }
            let bound = match &assignment.term.requirement {
                Requirement::VersionSet(VersionSet::Exact(version)) => {
                    BoundVersion::Version(version.clone())
                }
                Requirement::Revision(revision) => BoundVersion::Revision(revision.clone()),
                Requirement::Unversioned | Requirement::VersionSet(VersionSet::Any) => {
                    BoundVersion::Unversioned
                }
                Requirement::VersionSet(VersionSet::Empty | VersionSet::Range { .. }) => {
                    unreachable!("decisions are always concrete")
                }
            };
            let container = self.fetch(&assignment.term.package)?;
            bindings.push((container.updated_identifier(&bound), bound));
        }
        Ok(bindings)
    }

    /// In cache-confined mode, every exactly pinned input must be satisfied
    /// by an already fetched container.
    fn require_pinned_versions_fetched(&self, inputs: &[Constraint]) -> Result<(), SolveError> {
        let mut missing = Vec::new();
        for constraint in inputs {
            let Requirement::VersionSet(VersionSet::Exact(version)) = &constraint.requirement
            else {
                continue;
            };
            let available = match self.gateway.get_cached(&constraint.package) {
                Some(Ok(container)) => !container.versions(&|v| v == version).is_empty(),
                Some(Err(_)) | None => false,
            };
            if !available {
                missing.push(constraint.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SolveError::MissingVersions(missing))
        }
    }

    fn fetch(&self, package: &PackageReference) -> Result<Arc<dyn Container>, SolveError> {
        if self.only_use_fetched_containers {
            match self.gateway.get_cached(package) {
                Some(result) => Ok(result?),
                None => Err(SolveError::Provider(ProviderError::new(format!(
                    "container for {} has not been fetched",
                    package
                )))),
            }
        } else {
            Ok(self.gateway.get(package)?)
        }
    }

    /// Store an incompatibility and index it under every package it
    /// mentions. Re-adding an identical clause returns the existing id.
    fn add_incompatibility(
        &mut self,
        incompatibility: Incompatibility,
        location: StepLocation,
    ) -> IncompId {
        let first_package = &incompatibility.terms()[0].package;
        if let Some(ids) = self.incompatibilities.get(first_package) {
            if let Some(&existing) = ids.iter().find(|&&id| self.store[id] == incompatibility) {
                return existing;
            }
        }
        let id = self.store.alloc(incompatibility);
        self.index_incompatibility(id, location);
        id
    }

    fn index_incompatibility(&mut self, id: IncompId, location: StepLocation) {
        debug!("adding incompatibility {}", self.store[id]);
        let packages: Vec<PackageReference> = self.store[id]
            .terms()
            .iter()
            .map(|term| term.package.clone())
            .collect();
        for package in packages {
            let ids = self.incompatibilities.entry(package).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        let value = self.store[id].to_string();
        self.trace_general(StepKind::Incompatibility, location, value, None);
    }

    /// Incompatibilities whose term about `package` is positive, in
    /// insertion order.
    fn positive_incompatibilities(&self, package: &PackageReference) -> Vec<IncompId> {
        match self.incompatibilities.get(package) {
            None => Vec::new(),
            Some(ids) => ids
                .iter()
                .copied()
                .filter(|&id| {
                    self.store[id]
                        .get(package)
                        .is_some_and(|term| term.positive)
                })
                .collect(),
        }
    }

    fn emit(&mut self, step: TraceStep) {
        for sink in &mut self.sinks {
            sink.trace(&step);
        }
    }

    fn trace_general(
        &mut self,
        kind: StepKind,
        location: StepLocation,
        value: String,
        cause: Option<String>,
    ) {
        if self.sinks.is_empty() {
            return;
        }
        let decision_level = self.solution.decision_level();
        self.emit(TraceStep::General {
            value,
            kind,
            location,
            cause,
            decision_level,
        });
    }

    fn trace_decision(
        &mut self,
        package: &PackageReference,
        bound: &BoundVersion,
        location: StepLocation,
    ) {
        let value = format!("{} @ {}", package, bound);
        self.trace_general(StepKind::Decision, location, value, None);
    }

    fn trace_derivation(&mut self, term: &Term, cause: IncompId, location: StepLocation) {
        if self.sinks.is_empty() {
            return;
        }
        let rendered_cause = self.store[cause].to_string();
        self.trace_general(
            StepKind::Derivation,
            location,
            term.to_string(),
            Some(rendered_cause),
        );
    }
}
