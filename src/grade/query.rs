#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::ops::Range;

use bon::Builder;

use super::results::{Finding, FindingKind};
use crate::{
    java::{Parser, SourceModel, parser::CaptureHit},
    rubric::{QueryConstraint, Scope},
};

/// An enum to represent possible errors when running a query.
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    /// The capture named by the criterion is not in the query.
    #[error("No capture named `{0}` in the query")]
    NoCaptureSelected(String),
    /// The scoped method does not exist.
    #[error("No method named `{0}` to run the query on")]
    MissingScope(String),
    /// The query could not be run.
    #[error(
        "This query could not be run, likely due to a syntax \
         error.\nQuery:\n```\n{q}\n```\nError:\n```\n{e}\n```"
    )]
    DuringQueryExecution {
        /// The query that could not be run.
        q: String,
        /// The error that occurred.
        e: String,
    },
}

#[derive(Clone, Builder)]
#[builder(on(String, into))]
/// A query criterion bound to the submission it runs against.
pub struct QueryGrader<'a> {
    /// The criterion id.
    req_name:   String,
    /// The query to run.
    query:      String,
    /// The capture counted by the constraint.
    capture:    String,
    /// The constraint of the query.
    #[builder(default)]
    constraint: QueryConstraint,
    /// Where the query runs.
    #[builder(default)]
    scope:      Scope,
    /// The submission the query runs on.
    model:      &'a SourceModel,
}

impl QueryGrader<'_> {
    /// Byte ranges the query is restricted to; `None` for the whole file.
    fn ranges(&self) -> Result<Option<Vec<Range<usize>>>, QueryError> {
        match &self.scope {
            Scope::File => Ok(None),
            Scope::Method(name) => {
                let ranges: Vec<Range<usize>> = self
                    .model
                    .methods_named(name)
                    .map(|m| m.bytes.clone())
                    .collect();
                if ranges.is_empty() {
                    Err(QueryError::MissingScope(name.clone()))
                } else {
                    Ok(Some(ranges))
                }
            }
        }
    }

    /// Runs the query and returns the hits of the selected capture, in
    /// source order.
    pub fn run_query(&self) -> Result<Vec<CaptureHit>, QueryError> {
        let compiled = Parser::compile_query(&self.query).map_err(|e| QueryError::DuringQueryExecution {
            q: self.query.clone(),
            e: format!("{e:#}"),
        })?;
        if compiled.capture_index_for_name(&self.capture).is_none() {
            return Err(QueryError::NoCaptureSelected(self.capture.clone()));
        }

        let parser = self.model.parser();
        let mut hits = Vec::new();
        let ranges = match self.ranges()? {
            Some(ranges) => ranges.into_iter().map(Some).collect(),
            None => vec![None],
        };
        for range in ranges {
            let found = parser
                .hits_for(&compiled, range)
                .map_err(|e| QueryError::DuringQueryExecution {
                    q: self.query.clone(),
                    e: format!("{e:#}"),
                })?;
            hits.extend(found.into_iter().filter(|hit| hit.name == self.capture));
        }

        hits.sort_by_key(|hit| hit.bytes.start);
        hits.dedup_by_key(|hit| hit.bytes.clone());
        Ok(hits)
    }

    /// Grades the submission according to the query, capture, and
    /// constraint.
    pub fn grade_by_query(&self) -> Finding {
        let hits = match self.run_query() {
            Ok(hits) => hits,
            Err(QueryError::MissingScope(name)) => {
                return Finding::error(
                    self.req_name.clone(),
                    FindingKind::MissingMethod,
                    format!("no method named `{name}` to check"),
                    None,
                );
            }
            Err(e) => {
                return Finding::error(self.req_name.clone(), FindingKind::InvalidCriterion, e.to_string(), None);
            }
        };

        let first_line = hits.first().map(|hit| hit.line);
        match self.constraint {
            QueryConstraint::AtLeastOnce if hits.is_empty() => Finding::fail(
                self.req_name.clone(),
                FindingKind::PatternViolation,
                "required pattern not found",
                None,
            ),
            QueryConstraint::Exactly(n) if hits.len() != n => Finding::fail(
                self.req_name.clone(),
                FindingKind::PatternViolation,
                format!("pattern must match exactly {n} time(s), matched {}", hits.len()),
                first_line,
            ),
            QueryConstraint::MustNotMatch if !hits.is_empty() => Finding::fail(
                self.req_name.clone(),
                FindingKind::PatternViolation,
                format!("forbidden pattern found: `{}`", preview(&hits[0].text)),
                first_line,
            ),
            _ => Finding::pass(
                self.req_name.clone(),
                format!("pattern matched {} time(s)", hits.len()),
            ),
        }
    }
}

/// First line of `text`, capped at 60 characters.
fn preview(text: &str) -> String {
    let first_line = text.trim().lines().next().unwrap_or("");
    let mut head = first_line.chars().take(60).collect::<String>();
    if first_line.chars().count() > head.chars().count() {
        head.push('…');
    }
    head
}
