// SPDX-License-Identifier: MPL-2.0

//! Structured tracing of solver actions.
//!
//! The solver reports what it does as values and leaves formatting and
//! persistence to a sink. Two sinks ship with the crate: one writing
//! newline-terminated records to a lazily opened file, one writing to an
//! arbitrary stream.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::warn;

/// Which kind of solver action a general trace step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// An incompatibility was added to the store.
    Incompatibility,
    /// A package was committed to a binding.
    Decision,
    /// A term was forced by unit propagation.
    Derivation,
}

/// Where in the algorithm a trace step originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLocation {
    /// Seeding of the top-level constraints.
    TopLevel,
    /// The unit propagation loop.
    UnitPropagation,
    /// Decision making.
    DecisionMaking,
    /// Conflict resolution.
    ConflictResolution,
}

impl fmt::Display for StepLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepLocation::TopLevel => "top level",
            StepLocation::UnitPropagation => "unit propagation",
            StepLocation::DecisionMaking => "decision making",
            StepLocation::ConflictResolution => "conflict resolution",
        })
    }
}

/// One traced solver action.
#[derive(Debug, Clone)]
pub enum TraceStep {
    /// An incompatibility, decision or derivation was recorded.
    General {
        /// Rendering of the incompatibility, binding or term involved.
        value: String,
        /// What happened.
        kind: StepKind,
        /// Where it happened.
        location: StepLocation,
        /// Rendering of the causing incompatibility, when there is one.
        cause: Option<String>,
        /// Decision level at the time of the step.
        decision_level: usize,
    },
    /// One rewrite step during conflict resolution.
    ConflictResolution {
        /// The conflict being resolved.
        incompatibility: String,
        /// The term resolved away in this step.
        term: String,
        /// The assignment that satisfied that term.
        satisfier: String,
    },
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceStep::General {
                value,
                kind,
                location,
                cause,
                decision_level,
            } => {
                let kind = match kind {
                    StepKind::Incompatibility => "incompatibility",
                    StepKind::Decision => "decision",
                    StepKind::Derivation => "derivation",
                };
                write!(f, "[{}] [level {}] {}: {}", location, decision_level, kind, value)?;
                if let Some(cause) = cause {
                    write!(f, " (cause: {})", cause)?;
                }
                Ok(())
            }
            TraceStep::ConflictResolution {
                incompatibility,
                term,
                satisfier,
            } => write!(
                f,
                "[conflict resolution] resolving {} against {} satisfied by {}",
                incompatibility, term, satisfier
            ),
        }
    }
}

/// Receives trace steps by value.
pub trait TraceSink: Send {
    /// Record one step.
    fn trace(&mut self, step: &TraceStep);
}

/// Writes one line per step to a file, opened lazily on the first step and
/// flushed after every record. Open failures disable the sink with a
/// warning rather than aborting the solve.
pub(crate) struct FileSink {
    path: PathBuf,
    file: FileState,
}

enum FileState {
    Unopened,
    Open(BufWriter<File>),
    Failed,
}

impl FileSink {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: FileState::Unopened,
        }
    }
}

impl TraceSink for FileSink {
    fn trace(&mut self, step: &TraceStep) {
        if let FileState::Unopened = self.file {
            self.file = match File::create(&self.path) {
                Ok(file) => FileState::Open(BufWriter::new(file)),
                Err(error) => {
                    warn!("cannot open trace file {}: {}", self.path.display(), error);
                    FileState::Failed
                }
            };
        }
        if let FileState::Open(writer) = &mut self.file {
            let outcome = writeln!(writer, "{}", step).and_then(|()| writer.flush());
            if let Err(error) = outcome {
                warn!("cannot write trace file {}: {}", self.path.display(), error);
                self.file = FileState::Failed;
            }
        }
    }
}

/// Writes one line per step to a caller-supplied stream.
pub(crate) struct StreamSink {
    stream: Box<dyn Write + Send>,
}

impl StreamSink {
    pub(crate) fn new(stream: Box<dyn Write + Send>) -> Self {
        Self { stream }
    }
}

impl TraceSink for StreamSink {
    fn trace(&mut self, step: &TraceStep) {
        let outcome = writeln!(self.stream, "{}", step).and_then(|()| self.stream.flush());
        if let Err(error) = outcome {
            warn!("cannot write trace stream: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stream_sink_writes_line_per_step() {
        let buffer = SharedBuffer::default();
        let mut sink = StreamSink::new(Box::new(buffer.clone()));
        sink.trace(&TraceStep::General {
            value: "¬a ^1.0.0 is mandatory".to_string(),
            kind: StepKind::Incompatibility,
            location: StepLocation::TopLevel,
            cause: None,
            decision_level: 0,
        });
        sink.trace(&TraceStep::ConflictResolution {
            incompatibility: "a ^1.0.0 is forbidden".to_string(),
            term: "a ^1.0.0".to_string(),
            satisfier: "a 1.2.0".to_string(),
        });

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[top level] [level 0] incompatibility:"));
        assert!(lines[1].starts_with("[conflict resolution]"));
    }

    #[test]
    fn file_sink_opens_lazily() {
        let dir = std::env::temp_dir().join("depsolve-trace-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("trace-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut sink = FileSink::new(path.clone());
        assert!(!path.exists());
        sink.trace(&TraceStep::General {
            value: "root is 1.0.0".to_string(),
            kind: StepKind::Decision,
            location: StepLocation::TopLevel,
            cause: None,
            decision_level: 0,
        });
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with('\n'));
        assert!(contents.contains("decision: root is 1.0.0"));
        let _ = std::fs::remove_file(&path);
    }
}
