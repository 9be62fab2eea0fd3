//! # javagrader
//!
//! A rubric-driven grading engine for small Java exercises. A submission is
//! parsed into a structural model, checked statically against the rubric's
//! structural criteria, compiled and run in a sandbox against its behavioral
//! test cases, and scored into a report.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Grader configuration, from the environment or built explicitly
pub mod config;
/// Checking, running and scoring
pub mod grade;
/// Java parsing and structural extraction
pub mod java;
/// Supervised child processes
pub mod process;
/// Rubric format and validation
pub mod rubric;
/// Compiling and running untrusted code
pub mod sandbox;
/// Student submissions
pub mod submission;
/// Small shared types
pub mod types;
/// Utility functions for convenience
pub mod util;

pub use config::GraderConfig;
pub use grade::{Finding, FindingKind, GradeError, Grader, Report, Status};
pub use java::{ExtractionError, SourceModel, extract};
pub use rubric::{Rubric, RubricError};
pub use sandbox::{JvmSandbox, Sandbox, SandboxError};
pub use submission::Submission;

/// Defined for convenience
type Dict = std::collections::HashMap<String, String>;
