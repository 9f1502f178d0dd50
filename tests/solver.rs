// SPDX-License-Identifier: MPL-2.0

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use depsolve::{
    BoundVersion, Constraint, OfflineContainerProvider, PackageReference, Requirement, SolveError,
    Solver, SolverOptions, Version, VersionSet,
};

fn v(s: &str) -> Version {
    s.parse().unwrap()
}

fn pkg(name: &str) -> PackageReference {
    PackageReference::remote(name)
}

fn caret(name: &str, lower: &str) -> Constraint {
    Constraint::new(
        pkg(name),
        Requirement::version_set(VersionSet::up_to_next_major(v(lower))),
    )
}

fn range(name: &str, lower: &str, upper: &str) -> Constraint {
    Constraint::new(
        pkg(name),
        Requirement::version_set(VersionSet::range(v(lower), v(upper))),
    )
}

fn exact(name: &str, version: &str) -> Constraint {
    Constraint::new(pkg(name), Requirement::exact(v(version)))
}

fn revision(name: &str, rev: &str) -> Constraint {
    Constraint::new(pkg(name), Requirement::revision(rev))
}

fn unversioned(name: &str) -> Constraint {
    Constraint::new(pkg(name), Requirement::Unversioned)
}

fn solve(
    provider: OfflineContainerProvider,
    dependencies: &[Constraint],
) -> Result<BTreeMap<String, BoundVersion>, SolveError> {
    solve_with_pins(provider, dependencies, &[])
}

fn solve_with_pins(
    provider: OfflineContainerProvider,
    dependencies: &[Constraint],
    pins: &[Constraint],
) -> Result<BTreeMap<String, BoundVersion>, SolveError> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut solver = Solver::new(Arc::new(provider));
    let solution = solver.solve(dependencies, pins)?;
    Ok(solution
        .into_iter()
        .map(|(package, bound)| (package.identity().to_string(), bound))
        .collect())
}

#[test]
fn resolves_a_chain_to_the_highest_matching_versions() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), [caret("b", "1.0.0")]);
    provider.add_dependencies(pkg("b"), v("1.0.0"), [caret("c", "1.0.0")]);
    provider.add_dependencies(pkg("c"), v("1.0.0"), []);
    provider.add_dependencies(pkg("c"), v("2.0.0"), []);

    let bindings = solve(provider, &[caret("a", "1.0.0")]).unwrap();
    assert_eq!(
        bindings,
        BTreeMap::from([
            ("a".to_string(), BoundVersion::Version(v("1.0.0"))),
            ("b".to_string(), BoundVersion::Version(v("1.0.0"))),
            ("c".to_string(), BoundVersion::Version(v("1.0.0"))),
        ])
    );
}

#[test]
fn prefers_the_highest_version_the_constraint_admits() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), [caret("b", "1.0.0")]);
    provider.add_dependencies(pkg("a"), v("2.0.0"), [caret("b", "2.0.0")]);
    provider.add_dependencies(pkg("b"), v("1.0.0"), []);
    provider.add_dependencies(pkg("b"), v("2.0.0"), []);

    let bindings = solve(provider, &[range("a", "1.0.0", "3.0.0")]).unwrap();
    assert_eq!(
        bindings,
        BTreeMap::from([
            ("a".to_string(), BoundVersion::Version(v("2.0.0"))),
            ("b".to_string(), BoundVersion::Version(v("2.0.0"))),
        ])
    );
}

#[test]
fn backjumps_away_from_a_conflicting_newer_version() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("2.0.0"), [caret("b", "2.0.0")]);
    provider.add_dependencies(pkg("a"), v("1.0.0"), [caret("b", "1.0.0")]);
    provider.add_dependencies(pkg("b"), v("2.0.0"), [caret("c", "2.0.0")]);
    provider.add_dependencies(pkg("b"), v("1.0.0"), []);
    provider.add_dependencies(pkg("c"), v("1.0.0"), []);

    // a 2.0.0 transitively needs c ^2.0.0, which the top level rules out;
    // the solver must fall back to a 1.0.0 rather than fail.
    let bindings = solve(
        provider,
        &[range("a", "1.0.0", "3.0.0"), caret("c", "1.0.0")],
    )
    .unwrap();
    assert_eq!(
        bindings,
        BTreeMap::from([
            ("a".to_string(), BoundVersion::Version(v("1.0.0"))),
            ("b".to_string(), BoundVersion::Version(v("1.0.0"))),
            ("c".to_string(), BoundVersion::Version(v("1.0.0"))),
        ])
    );
}

#[test]
fn reports_an_unsatisfiable_transitive_constraint() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), [caret("b", "1.0.0")]);
    provider.add_dependencies(pkg("b"), v("1.0.0"), [caret("c", "1.0.0")]);
    provider.add_dependencies(pkg("c"), v("1.0.0"), []);
    provider.add_dependencies(pkg("c"), v("2.0.0"), []);

    let error = solve(provider, &[caret("a", "1.0.0"), caret("c", "2.0.0")]).unwrap_err();
    let SolveError::Unresolvable { diagnostic } = error else {
        panic!("expected an unresolvable error, got {:?}", error)
    };
    // The explanation walks the whole derivation chain.
    assert!(diagnostic.contains("a ^1.0.0"), "{diagnostic}");
    assert!(diagnostic.contains("b ^1.0.0"), "{diagnostic}");
    assert!(diagnostic.contains("c"), "{diagnostic}");
    assert!(diagnostic.contains("version solving failed"), "{diagnostic}");
}

#[test]
fn an_exact_pin_narrows_a_compatible_range() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), []);
    provider.add_dependencies(pkg("a"), v("1.1.0"), []);

    let bindings =
        solve_with_pins(provider, &[caret("a", "1.0.0")], &[exact("a", "1.0.0")]).unwrap();
    assert_eq!(
        bindings,
        BTreeMap::from([("a".to_string(), BoundVersion::Version(v("1.0.0")))])
    );
}

#[test]
fn a_revision_constraint_listed_first_wins_over_a_range() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("c"), v("1.0.0"), []);
    provider.add_revision(pkg("c"), "develop", []);

    let bindings = solve(
        provider.clone(),
        &[revision("c", "develop"), caret("c", "1.0.0")],
    )
    .unwrap();
    assert_eq!(
        bindings,
        BTreeMap::from([("c".to_string(), BoundVersion::Revision("develop".to_string()))])
    );

    // With the range listed first the revision pin can no longer be
    // honored, and the two constraints are mutually exclusive.
    let error = solve(provider, &[caret("c", "1.0.0"), revision("c", "develop")]).unwrap_err();
    assert!(matches!(error, SolveError::Unresolvable { .. }), "{error:?}");
}

#[test]
fn an_unversioned_binding_dominates_version_constraints() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_unversioned(pkg("b"), [caret("a", "1.0.0")]);
    provider.add_dependencies(pkg("a"), v("1.0.0"), []);

    let bindings = solve(provider, &[unversioned("b"), exact("a", "1.0.0")]).unwrap();
    assert_eq!(
        bindings,
        BTreeMap::from([
            ("a".to_string(), BoundVersion::Version(v("1.0.0"))),
            ("b".to_string(), BoundVersion::Unversioned),
        ])
    );
}

#[test]
fn repeated_solves_return_the_same_bindings() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), [caret("b", "1.0.0"), caret("c", "1.0.0")]);
    provider.add_dependencies(pkg("b"), v("1.0.0"), []);
    provider.add_dependencies(pkg("b"), v("1.4.0"), [range("c", "1.0.0", "1.2.0")]);
    provider.add_dependencies(pkg("c"), v("1.0.0"), []);
    provider.add_dependencies(pkg("c"), v("1.5.0"), []);

    let constraints = [caret("a", "1.0.0")];
    let mut solver = Solver::new(Arc::new(provider.clone()));
    let first = solver.solve(&constraints, &[]).unwrap();
    for _ in 0..10 {
        assert_eq!(solver.solve(&constraints, &[]).unwrap(), first);
    }

    // A fresh solver over the same provider agrees too.
    let mut other = Solver::new(Arc::new(provider));
    assert_eq!(other.solve(&constraints, &[]).unwrap(), first);
}

#[test]
fn explains_when_no_version_matches_a_requirement() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), [caret("b", "3.0.0")]);
    provider.add_dependencies(pkg("b"), v("1.0.0"), []);

    let error = solve(provider, &[caret("a", "1.0.0")]).unwrap_err();
    let SolveError::Unresolvable { diagnostic } = error else {
        panic!("expected an unresolvable error, got {:?}", error)
    };
    assert!(
        diagnostic.contains("no versions of b match the requirement ^3.0.0"),
        "{diagnostic}"
    );
    assert!(diagnostic.contains("version solving failed"), "{diagnostic}");
}

#[test]
fn a_versioned_dependency_may_not_impose_revision_pins() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), [revision("b", "develop")]);
    provider.add_revision(pkg("b"), "develop", []);

    let error = solve(provider, &[caret("a", "1.0.0")]).unwrap_err();
    let SolveError::IncompatibleConstraints {
        dependency,
        revisions,
    } = error
    else {
        panic!("expected incompatible constraints, got {:?}", error)
    };
    assert_eq!(dependency.package, pkg("a"));
    assert_eq!(revisions, vec![(pkg("b"), "develop".to_string())]);
}

#[test]
fn revision_dependency_cycles_are_detected() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_revision(pkg("a"), "develop", [revision("b", "develop")]);
    provider.add_revision(pkg("b"), "develop", [revision("a", "develop")]);

    let error = solve(provider, &[revision("a", "develop")]).unwrap_err();
    assert_eq!(error, SolveError::Cycle(pkg("a")));
}

#[test]
fn provider_errors_pass_through_unchanged() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), [caret("ghost", "1.0.0")]);

    let error = solve(provider, &[caret("a", "1.0.0")]).unwrap_err();
    let SolveError::Provider(provider_error) = error else {
        panic!("expected a provider error, got {:?}", error)
    };
    assert!(provider_error.message.contains("ghost"));
}

#[test]
fn cache_confined_solves_reject_unfetched_exact_pins() {
    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), []);

    let options = SolverOptions {
        only_use_fetched_containers: true,
        ..SolverOptions::default()
    };
    let mut solver = Solver::with_options(Arc::new(provider), options);
    let pin = exact("a", "1.0.0");

    // Nothing has been fetched yet.
    let error = solver.solve(&[], std::slice::from_ref(&pin)).unwrap_err();
    assert_eq!(error, SolveError::MissingVersions(vec![pin.clone()]));

    // Once a prefetch has landed the same solve goes through.
    solver.prefetch([pkg("a")]);
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match solver.solve(&[], std::slice::from_ref(&pin)) {
            Err(SolveError::MissingVersions(_)) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10));
            }
            outcome => {
                let solution = outcome.unwrap();
                assert_eq!(solution, vec![(pkg("a"), BoundVersion::Version(v("1.0.0")))]);
                break;
            }
        }
    }
}

#[test]
fn trace_streams_see_decisions_and_derivations() {
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut provider = OfflineContainerProvider::new();
    provider.add_dependencies(pkg("a"), v("1.0.0"), [caret("b", "1.0.0")]);
    provider.add_dependencies(pkg("b"), v("1.0.0"), []);

    let buffer = SharedBuffer::default();
    let options = SolverOptions {
        trace_stream: Some(Box::new(buffer.clone())),
        ..SolverOptions::default()
    };
    let mut solver = Solver::with_options(Arc::new(provider), options);
    solver.solve(&[caret("a", "1.0.0")], &[]).unwrap();

    let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert!(written.contains("incompatibility"), "{written}");
    assert!(written.contains("derivation"), "{written}");
    assert!(written.contains("decision"), "{written}");
    assert!(written.lines().all(|line| !line.is_empty()), "{written}");
}

#[test]
fn an_empty_dependency_list_resolves_to_nothing() {
    let provider = OfflineContainerProvider::new();
    let mut solver = Solver::new(Arc::new(provider));
    assert_eq!(solver.solve(&[], &[]).unwrap(), vec![]);
}
