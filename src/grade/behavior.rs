#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use tracing::{debug, instrument};

use super::{
    compare::compare,
    results::{Finding, FindingKind},
};
use crate::{
    config::GraderConfig,
    rubric::{BehaviorCase, Rubric},
    sandbox::{ArtifactCache, CompileOutcome, ExecutionResult, Sandbox, SandboxError},
    submission::Submission,
};

/// Runs the behavioral criteria of a rubric against one submission.
///
/// The source is compiled at most once per cache; every test case then runs
/// in its own sandboxed process.
pub struct BehaviorRunner<'a, S> {
    /// Compiles and runs.
    sandbox: &'a S,
    /// Compile outcomes shared across submissions.
    cache:   &'a ArtifactCache,
    /// Default limits.
    config:  &'a GraderConfig,
}

impl<'a, S: Sandbox> BehaviorRunner<'a, S> {
    /// A runner over `sandbox`.
    pub fn new(sandbox: &'a S, cache: &'a ArtifactCache, config: &'a GraderConfig) -> Self {
        Self {
            sandbox,
            cache,
            config,
        }
    }

    /// One finding per behavioral criterion, in declaration order.
    ///
    /// A rejected compilation is reported on every case without running
    /// anything. Only failures of the sandbox itself are returned as errors.
    #[instrument(skip_all, fields(submission = %submission.id, rubric = %rubric.id))]
    pub async fn run(&self, submission: &Submission, rubric: &Rubric) -> Result<Vec<Finding>, SandboxError> {
        let cases: Vec<(&str, &BehaviorCase)> = rubric
            .behavioral()
            .filter_map(|(_, c)| c.behavior().map(|case| (c.id.as_str(), case)))
            .collect();
        if cases.is_empty() {
            return Ok(Vec::new());
        }

        let outcome: Arc<CompileOutcome> = self
            .cache
            .get_or_compile(self.sandbox, &submission.source)
            .await?;

        let artifact = match outcome.as_ref() {
            CompileOutcome::Compiled(artifact) => artifact,
            CompileOutcome::Rejected(failure) => {
                debug!("compilation rejected; skipping {} case(s)", cases.len());
                let result = ExecutionResult::CompileError(failure.clone());
                return Ok(cases
                    .iter()
                    .map(|(id, case)| judge(id, case, &result))
                    .collect());
            }
        };

        let runs = cases.iter().map(|(id, case)| async move {
            let limit = case
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.config.run_timeout());
            let result = self
                .sandbox
                .run(artifact, &case.input, &case.args, limit)
                .await?;
            Ok::<_, SandboxError>(judge(id, case, &result))
        });

        join_all(runs).await.into_iter().collect()
    }
}

/// Turns one execution result into a finding.
pub fn judge(id: &str, case: &BehaviorCase, result: &ExecutionResult) -> Finding {
    match result {
        ExecutionResult::CompileError(failure) => {
            Finding::error(id, FindingKind::CompileError, failure.summary(), failure.line())
        }
        ExecutionResult::Timeout { limit } => Finding::fail(
            id,
            FindingKind::Timeout,
            format!("no result within {} ms", limit.as_millis()),
            None,
        ),
        ExecutionResult::RuntimeFault {
            exit_code,
            diagnostic,
            line_refs,
        } => {
            let detail = match exit_code {
                Some(code) => format!("{diagnostic} (exit code {code})"),
                None => diagnostic.clone(),
            };
            Finding::fail(
                id,
                FindingKind::RuntimeFault,
                detail,
                line_refs.first().map(|r| r.line_number),
            )
        }
        ExecutionResult::Completed {
            stdout, truncated, ..
        } => match compare(&case.expected, stdout, case.comparison) {
            Ok(()) if !truncated => Finding::pass(id, "output matches"),
            Ok(()) => Finding::pass(id, "output matches (cut off at the size limit)"),
            Err(why) if *truncated => Finding::fail(
                id,
                FindingKind::OutputMismatch,
                format!("{why} (output cut off at the size limit)"),
                None,
            ),
            Err(why) => Finding::fail(id, FindingKind::OutputMismatch, why, None),
        },
    }
}
