#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::HashSet, path::Path};

use bon::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::java::{Construct, Operator, Parser};

/// Points a rubric is worth when it does not say.
const DEFAULT_MAX_POINTS: f64 = 10.0;

/// Errors raised while loading or validating a rubric.
#[derive(Debug, Error)]
pub enum RubricError {
    /// The rubric file could not be read.
    #[error("could not read rubric `{path}`")]
    Io {
        /// Path that was read.
        path:   String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The rubric document is not valid JSON for a rubric.
    #[error("could not parse rubric: {0}")]
    Parse(#[from] serde_json::Error),
    /// The rubric id or a criterion id is empty.
    #[error("rubric and criterion ids must not be empty")]
    EmptyId,
    /// Two criteria share an id.
    #[error("duplicate criterion id `{0}`")]
    DuplicateId(String),
    /// A weight is negative, NaN or infinite.
    #[error("criterion `{id}` has an invalid weight {weight}")]
    InvalidWeight {
        /// Offending criterion.
        id:     String,
        /// Offending weight.
        weight: f64,
    },
    /// `max_points` is negative, NaN or infinite.
    #[error("max_points must be a finite, non-negative number (got {0})")]
    InvalidMaxPoints(f64),
    /// A numeric tolerance is negative or not finite.
    #[error("criterion `{id}` has an invalid epsilon {epsilon}")]
    InvalidEpsilon {
        /// Offending criterion.
        id:      String,
        /// Offending epsilon.
        epsilon: f64,
    },
    /// A query criterion does not compile or lacks its capture.
    #[error("criterion `{id}` has an invalid query: {message}")]
    InvalidQuery {
        /// Offending criterion.
        id:      String,
        /// Why the query was rejected.
        message: String,
    },
}

/// Whether a construct or operator must appear or must not appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Must appear at least once in scope.
    Required,
    /// Must not appear anywhere in scope.
    Forbidden,
}

/// Part of the submission a criterion looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Every method of every type.
    #[default]
    File,
    /// Every overload of the named method.
    Method(String),
}

/// How actual output is compared to the expected output.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Byte equality after trimming one trailing newline.
    #[default]
    Exact,
    /// Token-wise numeric comparison.
    NumericTolerance {
        /// Largest allowed absolute difference per token.
        epsilon: f64,
    },
}

/// How many times a query must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryConstraint {
    /// The query must match at least once.
    #[default]
    AtLeastOnce,
    /// The query must match exactly this many times.
    Exactly(usize),
    /// The query must not match.
    MustNotMatch,
}

/// Identifier naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// `^[a-z][a-zA-Z0-9]*$`
    #[default]
    CamelCase,
}

/// Identifiers a naming criterion applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingTarget {
    /// Method names (`main` included).
    Methods,
    /// Formal parameter names.
    Parameters,
    /// Local variable names.
    Locals,
}

/// Every naming target, the default selection.
fn all_targets() -> Vec<NamingTarget> {
    vec![NamingTarget::Methods, NamingTarget::Parameters, NamingTarget::Locals]
}

/// What a criterion checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriterionKind {
    /// A method with exactly this signature must exist.
    Signature {
        /// Method name.
        name:        String,
        /// Ordered parameter types.
        #[serde(default)]
        params:      Vec<String>,
        /// Return type.
        return_type: String,
    },
    /// A construct must (not) be used in scope.
    Construct {
        /// The construct.
        construct: Construct,
        /// Required or forbidden.
        rule:      Rule,
        /// Where to look.
        #[serde(default)]
        scope:     Scope,
    },
    /// An operator must (not) be used in scope.
    Operator {
        /// The operator.
        operator: Operator,
        /// Required or forbidden.
        rule:     Rule,
        /// Where to look.
        #[serde(default)]
        scope:    Scope,
    },
    /// Only the listed operators may be used in scope.
    AllowedOperators {
        /// The whitelist.
        operators: Vec<Operator>,
        /// Where to look.
        #[serde(default)]
        scope:     Scope,
    },
    /// A tree-sitter query over the source.
    Query {
        /// Query text.
        query:      String,
        /// Capture counted by the constraint.
        capture:    String,
        /// Match-count constraint.
        #[serde(default)]
        constraint: QueryConstraint,
        /// Where to look.
        #[serde(default)]
        scope:      Scope,
    },
    /// Identifiers must follow a naming convention.
    Naming {
        /// The convention.
        #[serde(default)]
        convention: NamingConvention,
        /// Identifiers checked.
        #[serde(default = "all_targets")]
        targets:    Vec<NamingTarget>,
    },
    /// Names read in a method must be declared in it or as fields.
    VariableScope {
        /// Methods checked.
        #[serde(default)]
        scope: Scope,
    },
    /// Run the program and compare its output.
    Behavior(BehaviorCase),
}

/// One input/output test case.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct BehaviorCase {
    /// Text written to stdin.
    #[serde(default)]
    #[builder(default)]
    pub input:      String,
    /// Command-line arguments.
    #[serde(default)]
    #[builder(default)]
    pub args:       Vec<String>,
    /// Expected stdout.
    pub expected:   String,
    /// How stdout is compared.
    #[serde(default)]
    #[builder(default)]
    pub comparison: Comparison,
    /// Per-case wall-clock limit; the configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// One gradable unit of a rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Identifier, unique within the rubric.
    pub id:          String,
    /// Weight in the score.
    #[serde(default = "default_weight")]
    pub weight:      f64,
    /// Optional explanation shown with the finding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What is checked.
    #[serde(flatten)]
    pub kind:        CriterionKind,
}

/// Default criterion weight.
fn default_weight() -> f64 {
    1.0
}

impl Criterion {
    /// A criterion with weight 1.
    pub fn new(id: impl Into<String>, kind: CriterionKind) -> Self {
        Self {
            id: id.into(),
            weight: default_weight(),
            description: None,
            kind,
        }
    }

    /// Replaces the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Whether this criterion needs the program to run.
    pub fn is_behavioral(&self) -> bool {
        matches!(self.kind, CriterionKind::Behavior(_))
    }

    /// The test case, for behavioral criteria.
    pub fn behavior(&self) -> Option<&BehaviorCase> {
        match &self.kind {
            CriterionKind::Behavior(case) => Some(case),
            _ => None,
        }
    }
}

/// Instructor-declared requirements for one exercise.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct Rubric {
    /// Rubric identifier.
    pub id:             String,
    /// Display name.
    #[serde(default)]
    #[builder(default)]
    pub name:           String,
    /// Class the signatures are expected on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_class: Option<String>,
    /// Points awarded for a perfect score.
    #[serde(default = "default_max_points")]
    #[builder(default = DEFAULT_MAX_POINTS)]
    pub max_points:     f64,
    /// Criteria in declaration order.
    #[builder(default)]
    pub criteria:       Vec<Criterion>,
}

/// Default value of `max_points`.
fn default_max_points() -> f64 {
    DEFAULT_MAX_POINTS
}

impl Rubric {
    /// Parses and validates a JSON rubric.
    pub fn from_json(text: &str) -> Result<Self, RubricError> {
        let rubric: Rubric = serde_json::from_str(text)?;
        rubric.validate()?;
        Ok(rubric)
    }

    /// Reads, parses and validates a JSON rubric file.
    pub fn from_path(path: &Path) -> Result<Self, RubricError> {
        let text = std::fs::read_to_string(path).map_err(|source| RubricError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Checks ids, weights, tolerances and queries.
    pub fn validate(&self) -> Result<(), RubricError> {
        if self.id.trim().is_empty() {
            return Err(RubricError::EmptyId);
        }
        if !self.max_points.is_finite() || self.max_points < 0.0 {
            return Err(RubricError::InvalidMaxPoints(self.max_points));
        }

        let mut seen = HashSet::new();
        for criterion in &self.criteria {
            if criterion.id.trim().is_empty() {
                return Err(RubricError::EmptyId);
            }
            if !seen.insert(criterion.id.as_str()) {
                return Err(RubricError::DuplicateId(criterion.id.clone()));
            }
            if !criterion.weight.is_finite() || criterion.weight < 0.0 {
                return Err(RubricError::InvalidWeight {
                    id:     criterion.id.clone(),
                    weight: criterion.weight,
                });
            }

            match &criterion.kind {
                CriterionKind::Behavior(BehaviorCase {
                    comparison: Comparison::NumericTolerance { epsilon },
                    ..
                }) if !epsilon.is_finite() || *epsilon < 0.0 => {
                    return Err(RubricError::InvalidEpsilon {
                        id:      criterion.id.clone(),
                        epsilon: *epsilon,
                    });
                }
                CriterionKind::Query { query, capture, .. } => {
                    let compiled = Parser::compile_query(query).map_err(|e| RubricError::InvalidQuery {
                        id:      criterion.id.clone(),
                        message: format!("{e:#}"),
                    })?;
                    if compiled.capture_index_for_name(capture).is_none() {
                        return Err(RubricError::InvalidQuery {
                            id:      criterion.id.clone(),
                            message: format!("capture `{capture}` is not in the query"),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Sum of all criterion weights.
    pub fn total_weight(&self) -> f64 {
        self.criteria.iter().map(|c| c.weight).sum()
    }

    /// Structural criteria with their declaration index.
    pub fn structural(&self) -> impl Iterator<Item = (usize, &Criterion)> {
        self.criteria
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_behavioral())
    }

    /// Behavioral criteria with their declaration index.
    pub fn behavioral(&self) -> impl Iterator<Item = (usize, &Criterion)> {
        self.criteria
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_behavioral())
    }
}
