#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use thiserror::Error;
use tracing::{Span, info, instrument, warn};

use super::{
    behavior::BehaviorRunner,
    conformance::check,
    results::{Finding, FindingKind, Report},
};
use crate::{
    config::GraderConfig,
    java::{ExtractionError, extract},
    rubric::Rubric,
    sandbox::{ArtifactCache, Sandbox, SandboxError},
    submission::Submission,
};

/// Errors that abort grading. Anything wrong with the submission itself is a
/// finding instead.
#[derive(Debug, Error)]
pub enum GradeError {
    /// The execution environment failed.
    #[error(transparent)]
    Infrastructure(#[from] SandboxError),
    /// A grading task panicked or was cancelled.
    #[error("internal grading failure: {0}")]
    Internal(String),
}

/// Grades submissions against rubrics.
pub struct Grader<S> {
    /// Compiles and runs submissions.
    sandbox: S,
    /// Limits and concurrency.
    config:  GraderConfig,
}

impl<S: Sandbox> Grader<S> {
    /// A grader over `sandbox`.
    pub fn new(sandbox: S, config: GraderConfig) -> Self {
        Self { sandbox, config }
    }

    /// The underlying sandbox.
    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    /// Grades one submission.
    ///
    /// Structural checks and behavioral tests run concurrently. The report
    /// has one finding per criterion, in rubric order. The submission is
    /// compiled at most once, and its workspace is gone by the time the
    /// report is returned.
    #[instrument(skip_all, fields(submission = %submission.id, submitter = %submission.submitter, rubric = %rubric.id))]
    pub async fn grade(&self, submission: &Submission, rubric: &Arc<Rubric>) -> Result<Report, GradeError> {
        let model = match extract(&submission.source, rubric.expected_class.as_deref()) {
            Ok(model) => model,
            Err(e) => {
                warn!("source does not parse: {e}");
                let report = Report::new(submission, rubric, unparsable(rubric, &e));
                info!(score = report.score, "graded");
                return Ok(report);
            }
        };

        let structural = {
            let rubric = Arc::clone(rubric);
            let span = Span::current();
            tokio::task::spawn_blocking(move || span.in_scope(|| check(&model, &rubric)))
        };
        let cache = ArtifactCache::new();
        let runner = BehaviorRunner::new(&self.sandbox, &cache, &self.config);
        let behavioral = runner.run(submission, rubric);

        let (structural, behavioral) = tokio::join!(structural, behavioral);
        let structural = structural.map_err(|e| GradeError::Internal(e.to_string()))?;
        let behavioral = behavioral?;

        let report = Report::new(submission, rubric, merge(rubric, structural, behavioral));
        info!(score = report.score, "graded");
        Ok(report)
    }

    /// Grades many submissions, at most `max_concurrent_submissions` at a
    /// time. Reports come back in input order.
    pub async fn grade_all(&self, submissions: &[Submission], rubric: &Arc<Rubric>) -> Result<Vec<Report>, GradeError> {
        stream::iter(submissions)
            .map(|submission| self.grade(submission, rubric))
            .buffered(self.config.max_concurrent_submissions())
            .try_collect()
            .await
    }
}

/// Findings for a source that does not parse: nothing is checked or run.
fn unparsable(rubric: &Rubric, error: &ExtractionError) -> Vec<Finding> {
    rubric
        .criteria
        .iter()
        .map(|criterion| {
            if criterion.is_behavioral() {
                Finding::error(
                    &criterion.id,
                    FindingKind::UnableToCompile,
                    format!("not run: {error}"),
                    error.line(),
                )
            } else {
                Finding::error(&criterion.id, FindingKind::SyntaxError, error.to_string(), error.line())
            }
        })
        .collect()
}

/// Interleaves structural and behavioral findings back into declaration
/// order.
fn merge(rubric: &Rubric, structural: Vec<Finding>, behavioral: Vec<Finding>) -> Vec<Finding> {
    let mut slots: Vec<Option<Finding>> = vec![None; rubric.criteria.len()];
    let placed = rubric
        .structural()
        .map(|(i, _)| i)
        .zip(structural)
        .chain(rubric.behavioral().map(|(i, _)| i).zip(behavioral));
    for (index, finding) in placed {
        slots[index] = Some(finding);
    }

    slots
        .into_iter()
        .zip(&rubric.criteria)
        .map(|(slot, criterion)| {
            slot.unwrap_or_else(|| {
                Finding::error(
                    &criterion.id,
                    FindingKind::InvalidCriterion,
                    "criterion was not evaluated",
                    None,
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grade::results::Status,
        rubric::{BehaviorCase, Criterion, CriterionKind},
    };

    fn rubric() -> Rubric {
        Rubric::builder()
            .id("r")
            .criteria(vec![
                Criterion::new(
                    "sig",
                    CriterionKind::Signature {
                        name:        "f".into(),
                        params:      vec![],
                        return_type: "void".into(),
                    },
                ),
                Criterion::new("out", CriterionKind::Behavior(BehaviorCase::builder().expected("x").build())),
                Criterion::new(
                    "sig2",
                    CriterionKind::Signature {
                        name:        "g".into(),
                        params:      vec![],
                        return_type: "void".into(),
                    },
                ),
            ])
            .build()
    }

    #[test]
    fn merge_restores_declaration_order() {
        let rubric = rubric();
        let merged = merge(
            &rubric,
            vec![Finding::pass("sig", ""), Finding::pass("sig2", "")],
            vec![Finding::pass("out", "")],
        );
        let ids: Vec<_> = merged.iter().map(|f| f.criterion_id.as_str()).collect();
        assert_eq!(ids, vec!["sig", "out", "sig2"]);
    }

    #[test]
    fn merge_fills_gaps() {
        let rubric = rubric();
        let merged = merge(&rubric, vec![Finding::pass("sig", "")], vec![]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].kind, FindingKind::InvalidCriterion);
        assert_eq!(merged[2].status, Status::Error);
    }

    #[test]
    fn unparsable_sources_degrade_every_criterion() {
        let rubric = rubric();
        let error = ExtractionError::Syntax {
            message: "missing `;`".into(),
            line:    Some(3),
            column:  Some(9),
        };
        let findings = unparsable(&rubric, &error);
        assert_eq!(findings[0].kind, FindingKind::SyntaxError);
        assert_eq!(findings[1].kind, FindingKind::UnableToCompile);
        assert!(findings.iter().all(|f| f.status == Status::Error && f.line == Some(3)));
    }
}
