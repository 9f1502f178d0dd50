// SPDX-License-Identifier: MPL-2.0

//! Turns the derivation graph behind an unresolvable incompatibility into a
//! numbered, human-readable explanation.
//!
//! The builder makes two passes. The first counts how often each learned
//! incompatibility is referenced, so that shared causes get a line number
//! and later mentions can refer back to it. The second walks the graph
//! bottom-up, fusing single-use intermediate steps into one sentence where
//! that reads better.

use crate::internal::{Arena, Cause, IncompId, Incompatibility};
use crate::{Map, Requirement, Term, VersionSet};

/// Render the explanation for a root cause incompatibility.
pub(crate) fn render(root_cause: IncompId, store: &Arena<Incompatibility>) -> String {
    let mut builder = ReportBuilder {
        store,
        reference_counts: Map::default(),
        line_numbers: Map::default(),
        lines: Vec::new(),
    };
    builder.count_references(root_cause);
    if builder.is_derived(root_cause) {
        builder.visit(root_cause, false);
    } else {
        let description = builder.describe(root_cause);
        builder.lines.push((format!("{}.", capitalize(&description)), None));
    }

    let mut rendered = String::new();
    for (line, number) in &builder.lines {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        match number {
            Some(number) => rendered.push_str(&format!("({}) {}", number, line)),
            None => rendered.push_str(line),
        }
    }
    rendered
}

struct ReportBuilder<'a> {
    store: &'a Arena<Incompatibility>,
    reference_counts: Map<IncompId, usize>,
    line_numbers: Map<IncompId, usize>,
    lines: Vec<(String, Option<usize>)>,
}

impl ReportBuilder<'_> {
    fn count_references(&mut self, id: IncompId) {
        let count = self.reference_counts.entry(id).or_insert(0);
        *count += 1;
        if *count > 1 {
            return;
        }
        if let Some((conflict, other)) = self.store[id].causes() {
            self.count_references(conflict);
            self.count_references(other);
        }
    }

    fn is_derived(&self, id: IncompId) -> bool {
        self.store[id].causes().is_some()
    }

    /// A derived incompatibility whose parents are both external renders as
    /// one "because A and B" sentence.
    fn is_single_line(&self, id: IncompId) -> bool {
        match self.store[id].causes() {
            Some((conflict, other)) => !self.is_derived(conflict) && !self.is_derived(other),
            None => false,
        }
    }

    /// Whether a derived parent can be fused into its child's sentence: it
    /// is referenced once, exactly one of its own parents is derived, and
    /// that parent has not been given a line number yet.
    fn is_collapsible(&self, id: IncompId) -> bool {
        if self.reference_counts.get(&id).copied().unwrap_or(0) > 1 {
            return false;
        }
        let Some((conflict, other)) = self.store[id].causes() else {
            return false;
        };
        if self.is_derived(conflict) == self.is_derived(other) {
            return false;
        }
        let derived = if self.is_derived(conflict) { conflict } else { other };
        !self.line_numbers.contains_key(&derived)
    }

    fn visit(&mut self, id: IncompId, is_conclusion: bool) {
        // A shared cause may already have been written out while one of its
        // referrers was visited; its line number now speaks for it.
        if self.line_numbers.contains_key(&id) {
            return;
        }
        let numbered = is_conclusion || self.reference_counts.get(&id).copied().unwrap_or(0) > 1;
        let description = self.describe(id);
        let (conflict, other) = self.store[id]
            .causes()
            .expect("only derived incompatibilities are visited");

        match (self.is_derived(conflict), self.is_derived(other)) {
            (true, true) => {
                let conflict_line = self.line_numbers.get(&conflict).copied();
                let other_line = self.line_numbers.get(&other).copied();
                match (conflict_line, other_line) {
                    (Some(conflict_line), Some(other_line)) => {
                        let message = format!(
                            "Because {} ({}) and {} ({}), {}.",
                            self.describe(conflict),
                            conflict_line,
                            self.describe(other),
                            other_line,
                            description
                        );
                        self.record(id, message, numbered);
                    }
                    (Some(line), None) => {
                        self.visit(other, false);
                        let message = format!(
                            "And because {} ({}), {}.",
                            self.describe(conflict),
                            line,
                            description
                        );
                        self.record(id, message, numbered);
                    }
                    (None, Some(line)) => {
                        self.visit(conflict, false);
                        let message = format!(
                            "And because {} ({}), {}.",
                            self.describe(other),
                            line,
                            description
                        );
                        self.record(id, message, numbered);
                    }
                    (None, None) => {
                        if self.is_single_line(conflict) || self.is_single_line(other) {
                            let (first, second) = if self.is_single_line(other) {
                                (conflict, other)
                            } else {
                                (other, conflict)
                            };
                            self.visit(first, false);
                            self.visit(second, false);
                            self.record(id, format!("Thus, {}.", description), numbered);
                        } else {
                            self.visit(conflict, true);
                            self.visit(other, false);
                            let line = self.line_numbers[&conflict];
                            let message = format!(
                                "And because {} ({}), {}.",
                                self.describe(conflict),
                                line,
                                description
                            );
                            self.record(id, message, numbered);
                        }
                    }
                }
            }
            (true, false) | (false, true) => {
                let (derived, external) = if self.is_derived(conflict) {
                    (conflict, other)
                } else {
                    (other, conflict)
                };
                if let Some(line) = self.line_numbers.get(&derived).copied() {
                    let message = format!(
                        "Because {} and {} ({}), {}.",
                        self.describe(external),
                        self.describe(derived),
                        line,
                        description
                    );
                    self.record(id, message, numbered);
                } else if self.is_collapsible(derived) {
                    let (nested_conflict, nested_other) =
                        self.store[derived].causes().expect("collapsible is derived");
                    let (nested_derived, nested_external) = if self.is_derived(nested_conflict) {
                        (nested_conflict, nested_other)
                    } else {
                        (nested_other, nested_conflict)
                    };
                    self.visit(nested_derived, false);
                    let message = format!(
                        "And because {} and {}, {}.",
                        self.describe(nested_external),
                        self.describe(external),
                        description
                    );
                    self.record(id, message, numbered);
                } else {
                    self.visit(derived, false);
                    let message =
                        format!("And because {}, {}.", self.describe(external), description);
                    self.record(id, message, numbered);
                }
            }
            (false, false) => {
                let message = format!(
                    "Because {} and {}, {}.",
                    self.describe(conflict),
                    self.describe(other),
                    description
                );
                self.record(id, message, numbered);
            }
        }
    }

    fn record(&mut self, id: IncompId, message: String, numbered: bool) {
        if numbered {
            let number = self.line_numbers.len() + 1;
            self.line_numbers.insert(id, number);
            self.lines.push((message, Some(number)));
        } else {
            self.lines.push((message, None));
        }
    }

    fn describe(&self, id: IncompId) -> String {
        let incompatibility = &self.store[id];
        let terms = incompatibility.terms();
        match &incompatibility.cause {
            Cause::Dependency { .. } if terms.len() == 2 => {
                let depender = &terms[0];
                let dependee = &terms[1];
                debug_assert!(depender.positive && !dependee.positive);
                format!(
                    "{} depends on {}",
                    self.describe_term(depender),
                    self.describe_term(dependee)
                )
            }
            Cause::NoAvailableVersion => {
                debug_assert!(terms.len() == 1 && terms[0].positive);
                format!(
                    "no versions of {} match the requirement {}",
                    terms[0].package, terms[0].requirement
                )
            }
            Cause::Root => {
                debug_assert_eq!(terms.len(), 1);
                format!("{} is {}", terms[0].package, terms[0].requirement)
            }
            Cause::Conflict { .. } if incompatibility.is_failure() => {
                "version solving failed".to_string()
            }
            Cause::Dependency { .. } | Cause::Conflict { .. } => self.describe_generic(terms),
        }
    }

    fn describe_generic(&self, terms: &[Term]) -> String {
        if let [term] = terms {
            return if term.positive {
                format!("{} is forbidden", self.describe_term(term))
            } else {
                format!("{} is required", self.describe_term(term))
            };
        }
        let positive: Vec<String> = terms
            .iter()
            .filter(|t| t.positive)
            .map(|t| self.describe_term(t))
            .collect();
        let negative: Vec<String> = terms
            .iter()
            .filter(|t| !t.positive)
            .map(|t| self.describe_term(t))
            .collect();
        match (positive.is_empty(), negative.is_empty()) {
            (false, false) => {
                if let [sole] = positive.as_slice() {
                    format!("{} requires {}", sole, negative.join(" or "))
                } else {
                    format!(
                        "if {} then {}",
                        positive.join(" and "),
                        negative.join(" or ")
                    )
                }
            }
            (false, true) => format!("one of {} must be false", positive.join(" or ")),
            (true, false) => format!("one of {} must be true", negative.join(" or ")),
            (true, true) => "version solving failed".to_string(),
        }
    }

    /// Describe the content of a term, ignoring its polarity.
    fn describe_term(&self, term: &Term) -> String {
        if term.package.is_root() {
            return "root".to_string();
        }
        match &term.requirement {
            Requirement::VersionSet(VersionSet::Any) => format!("every version of {}", term.package),
            Requirement::VersionSet(VersionSet::Empty) => format!("no version of {}", term.package),
            Requirement::VersionSet(set) => format!("{} {}", term.package, set),
            Requirement::Revision(revision) => format!("{} @{}", term.package, revision),
            Requirement::Unversioned => format!("local {}", term.package),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
