#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turning a submission and a rubric into a scored report.

/// Runs behavioral test cases in the sandbox.
pub mod behavior;
/// Output comparison strategies.
pub mod compare;
/// Static checks of structural criteria.
pub mod conformance;
/// javac diagnostics.
pub mod diagnostics;
/// Puts extraction, checking and execution together.
pub mod orchestrator;
/// Query criteria.
pub mod query;
/// Console and JSON rendering of reports.
pub mod report;
/// Findings and reports.
pub mod results;

pub use self::{
    behavior::BehaviorRunner,
    compare::compare,
    conformance::check,
    diagnostics::{DiagnosticSeverity, JavacDiagnostic},
    orchestrator::{GradeError, Grader},
    report::{show_findings, show_report, show_summary, to_json},
    results::{Finding, FindingKind, Report, Status},
};
