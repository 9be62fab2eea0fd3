#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Compiling and running untrusted Java under resource limits.

/// Write-once, per-submission cache of compile outcomes keyed by source text.
pub mod cache;
/// `bwrap` confinement for host processes.
pub mod jail;
/// `javac`/`java` backed sandbox.
pub mod jvm;

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use tempfile::TempDir;
use thiserror::Error;

pub use self::{cache::ArtifactCache, jvm::JvmSandbox};
use crate::{grade::diagnostics::JavacDiagnostic, types::LineRef};

/// Failures of the execution environment itself. These say nothing about
/// the submission and abort the grading run.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A required tool or runtime is missing or refuses to start.
    #[error("execution environment unavailable: {0:#}")]
    Unavailable(anyhow::Error),
    /// Workspace creation, spawning or I/O with the sandbox failed.
    #[error("sandbox failure: {0:#}")]
    Failure(anyhow::Error),
}

/// A compiled submission, ready to run. The private workspace is removed
/// once the last clone is dropped.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    /// Class whose `main` is launched.
    main_class: String,
    /// Directory holding the class files.
    dir:        PathBuf,
    /// Keeps the workspace alive.
    _workspace: Option<Arc<TempDir>>,
}

impl CompiledArtifact {
    /// Wraps a compiled workspace, which is deleted along with the artifact.
    pub fn in_workspace(main_class: impl Into<String>, workspace: TempDir) -> Self {
        Self {
            main_class: main_class.into(),
            dir: workspace.path().to_path_buf(),
            _workspace: Some(Arc::new(workspace)),
        }
    }

    /// An artifact for a directory this crate does not own.
    pub fn detached(main_class: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            main_class: main_class.into(),
            dir:        dir.into(),
            _workspace: None,
        }
    }

    /// Class whose `main` is launched.
    pub fn main_class(&self) -> &str {
        &self.main_class
    }

    /// Directory holding the class files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Why javac refused a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileFailure {
    /// Raw compiler output.
    pub output:      String,
    /// Parsed diagnostics, possibly empty.
    pub diagnostics: Vec<JavacDiagnostic>,
}

impl CompileFailure {
    /// A one-line summary: the first error diagnostic, or the first line of
    /// output.
    pub fn summary(&self) -> String {
        self.diagnostics
            .iter()
            .find(|d| d.severity().is_error())
            .or_else(|| self.diagnostics.first())
            .map(ToString::to_string)
            .or_else(|| {
                self.output
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "compilation failed".to_string())
    }

    /// Line of the first diagnostic, if any.
    pub fn line(&self) -> Option<usize> {
        self.diagnostics
            .first()
            .map(|d| d.line_number() as usize)
    }
}

/// Result of compiling one source text.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    /// javac accepted the source.
    Compiled(CompiledArtifact),
    /// javac rejected the source (or ran out of time).
    Rejected(CompileFailure),
}

/// Outcome of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// The source never compiled, so nothing ran.
    CompileError(CompileFailure),
    /// The wall-clock limit expired; the process was killed.
    Timeout {
        /// The limit that was exceeded.
        limit: Duration,
    },
    /// The program exited abnormally.
    RuntimeFault {
        /// Exit code, `None` when killed by a signal.
        exit_code:  Option<i32>,
        /// Summary of what went wrong.
        diagnostic: String,
        /// Stack frames pointing into Java sources.
        line_refs:  Vec<LineRef>,
    },
    /// The program exited normally or was cut off at the output ceiling.
    Completed {
        /// Captured stdout.
        stdout:    String,
        /// Exit code, `None` when cut off.
        exit_code: Option<i32>,
        /// Whether stdout hit the ceiling.
        truncated: bool,
    },
}

/// The process-execution capability the grader depends on.
pub trait Sandbox: Send + Sync {
    /// Compiles `source` in a fresh private workspace.
    fn compile(&self, source: &str) -> impl Future<Output = Result<CompileOutcome, SandboxError>> + Send;

    /// Runs a compiled artifact once with the given stdin, arguments and
    /// wall-clock limit.
    fn run(
        &self,
        artifact: &CompiledArtifact,
        input: &str,
        args: &[String],
        timeout: Duration,
    ) -> impl Future<Output = Result<ExecutionResult, SandboxError>> + Send;
}
