#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bon::Builder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One student's source for one exercise. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct Submission {
    /// Identity of this grading attempt.
    #[builder(default = Uuid::new_v4())]
    pub id:          Uuid,
    /// Who submitted it.
    #[builder(default)]
    pub submitter:   String,
    /// Exercise it was submitted for.
    #[builder(default)]
    pub exercise_id: String,
    /// Raw Java source.
    pub source:      String,
}

impl Submission {
    /// Reads a submission from disk. The submitter defaults to the file stem.
    pub fn from_path(path: &Path, exercise_id: &str, submitter: Option<&str>) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read submission {}", path.display()))?;
        let submitter = submitter.map(str::to_owned).unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        Ok(Submission::builder()
            .submitter(submitter)
            .exercise_id(exercise_id)
            .source(source)
            .build())
    }

    /// Reads one submission per path. An explicit `submitter` only names a
    /// lone submission; with several paths each is named after its file
    /// stem.
    pub fn from_paths(paths: &[PathBuf], exercise_id: &str, submitter: Option<&str>) -> Result<Vec<Self>> {
        let submitter = submitter.filter(|_| paths.len() == 1);
        paths
            .iter()
            .map(|path| Submission::from_path(path, exercise_id, submitter))
            .collect()
    }
}
