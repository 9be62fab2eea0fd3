#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::{self, Display};

use bon::Builder;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::{rubric::Rubric, submission::Submission};

/// Verdict of one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The criterion is satisfied.
    Pass,
    /// The submission violates the criterion.
    Fail,
    /// The criterion could not be evaluated.
    Error,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
        })
    }
}

/// Closed taxonomy of per-criterion outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// The criterion holds.
    Satisfied,
    /// The source does not parse.
    SyntaxError,
    /// The source parses but javac rejects it.
    CompileError,
    /// Not attempted because the source does not parse.
    UnableToCompile,
    /// No method with the required name.
    MissingMethod,
    /// A method with the required name exists with another signature.
    WrongSignature,
    /// A construct or operator rule is broken.
    ConstructViolation,
    /// A query constraint is broken.
    PatternViolation,
    /// An identifier breaks the naming convention.
    NamingViolation,
    /// A method reads a name it cannot see.
    ScopeViolation,
    /// The run exceeded its wall-clock limit.
    Timeout,
    /// The run exited abnormally.
    RuntimeFault,
    /// The run's output differs from the expected output.
    OutputMismatch,
    /// The criterion itself cannot be evaluated (e.g. a broken query).
    InvalidCriterion,
}

impl Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FindingKind::Satisfied => "Satisfied",
            FindingKind::SyntaxError => "SyntaxError",
            FindingKind::CompileError => "CompileError",
            FindingKind::UnableToCompile => "UnableToCompile",
            FindingKind::MissingMethod => "MissingMethod",
            FindingKind::WrongSignature => "WrongSignature",
            FindingKind::ConstructViolation => "ConstructViolation",
            FindingKind::PatternViolation => "PatternViolation",
            FindingKind::NamingViolation => "NamingViolation",
            FindingKind::ScopeViolation => "ScopeViolation",
            FindingKind::Timeout => "Timeout",
            FindingKind::RuntimeFault => "RuntimeFault",
            FindingKind::OutputMismatch => "OutputMismatch",
            FindingKind::InvalidCriterion => "InvalidCriterion",
        })
    }
}

/// One verdict for one rubric criterion.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct Finding {
    /// Criterion this finding is about.
    #[builder(getter)]
    pub criterion_id: String,
    /// Pass, fail or error.
    #[builder(getter)]
    pub status:       Status,
    /// What happened.
    #[builder(getter)]
    pub kind:         FindingKind,
    /// Human readable explanation.
    #[builder(default)]
    pub detail:       String,
    /// 1-based source line, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line:         Option<usize>,
}

impl Finding {
    /// A passing finding.
    pub fn pass(criterion_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Finding::builder()
            .criterion_id(criterion_id.into())
            .status(Status::Pass)
            .kind(FindingKind::Satisfied)
            .detail(detail.into())
            .build()
    }

    /// A failing finding.
    pub fn fail(
        criterion_id: impl Into<String>,
        kind: FindingKind,
        detail: impl Into<String>,
        line: Option<usize>,
    ) -> Self {
        Finding::builder()
            .criterion_id(criterion_id.into())
            .status(Status::Fail)
            .kind(kind)
            .detail(detail.into())
            .maybe_line(line)
            .build()
    }

    /// A finding for a criterion that could not be evaluated.
    pub fn error(
        criterion_id: impl Into<String>,
        kind: FindingKind,
        detail: impl Into<String>,
        line: Option<usize>,
    ) -> Self {
        Finding::builder()
            .criterion_id(criterion_id.into())
            .status(Status::Error)
            .kind(kind)
            .detail(detail.into())
            .maybe_line(line)
            .build()
    }

    /// Whether the criterion passed.
    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }
}

#[derive(Tabled)]
/// A finding flattened into table cells.
pub(crate) struct FindingRow {
    /// Criterion id.
    #[tabled(rename = "Criterion")]
    pub(crate) criterion: String,
    /// Status label.
    #[tabled(rename = "Status")]
    pub(crate) status:    String,
    /// Kind label.
    #[tabled(rename = "Kind")]
    pub(crate) kind:      String,
    /// Line, or `-`.
    #[tabled(rename = "Line")]
    pub(crate) line:      String,
    /// Explanation.
    #[tabled(rename = "Detail")]
    pub(crate) detail:    String,
}

impl From<&Finding> for FindingRow {
    fn from(finding: &Finding) -> Self {
        FindingRow {
            criterion: finding.criterion_id.clone(),
            status:    finding.status.to_string(),
            kind:      finding.kind.to_string(),
            line:      finding
                .line
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".to_string()),
            detail:    finding.detail.clone(),
        }
    }
}

/// Aggregate verdict for one submission against one rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Submission graded.
    pub submission_id: Uuid,
    /// Who submitted it.
    pub submitter:     String,
    /// Exercise it was submitted for.
    pub exercise_id:   String,
    /// Rubric applied.
    pub rubric_id:     String,
    /// One finding per criterion, in rubric order.
    pub findings:      Vec<Finding>,
    /// Weight of passing criteria.
    pub earned_weight: f64,
    /// Weight of all criteria.
    pub total_weight:  f64,
    /// `earned_weight / total_weight`, or 0 when there is no weight.
    pub score:         f64,
    /// `score * max_points`.
    pub points:        f64,
    /// Points for a perfect score.
    pub max_points:    f64,
}

impl Report {
    /// Scores `findings`, which must line up with `rubric.criteria`.
    pub fn new(submission: &Submission, rubric: &Rubric, findings: Vec<Finding>) -> Self {
        let total_weight = rubric.total_weight();
        let earned_weight: f64 = rubric
            .criteria
            .iter()
            .zip(&findings)
            .filter(|(_, finding)| finding.passed())
            .map(|(criterion, _)| criterion.weight)
            .sum();
        let score = if total_weight > 0.0 {
            earned_weight / total_weight
        } else {
            0.0
        };

        Report {
            submission_id: submission.id,
            submitter: submission.submitter.clone(),
            exercise_id: submission.exercise_id.clone(),
            rubric_id: rubric.id.clone(),
            findings,
            earned_weight,
            total_weight,
            score,
            points: score * rubric.max_points,
            max_points: rubric.max_points,
        }
    }

    /// Number of findings with the given status.
    pub fn count(&self, status: Status) -> usize {
        self.findings
            .iter()
            .filter(|f| f.status == status)
            .count()
    }

    /// The finding for `criterion_id`.
    pub fn finding(&self, criterion_id: &str) -> Option<&Finding> {
        self.findings
            .iter()
            .find(|f| f.criterion_id == criterion_id)
    }
}
