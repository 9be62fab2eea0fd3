#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use super::{CompileOutcome, Sandbox, SandboxError};

/// Compile outcomes of one submission, keyed by the exact source text.
///
/// Each entry is written once; concurrent callers asking for the same
/// source wait on the same compilation. A failed compilation attempt (an
/// infrastructure error) leaves the entry empty so a later caller retries.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    /// One cell per distinct source text.
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<CompileOutcome>>>>>,
}

impl ArtifactCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached outcome for `source`, compiling it with `sandbox`
    /// on first use.
    pub async fn get_or_compile<S>(&self, sandbox: &S, source: &str) -> Result<Arc<CompileOutcome>, SandboxError>
    where
        S: Sandbox,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(source.to_owned()).or_default().clone()
        };

        if let Some(outcome) = cell.get() {
            debug!("artifact cache hit");
            return Ok(outcome.clone());
        }

        let outcome = cell
            .get_or_try_init(|| async { sandbox.compile(source).await.map(Arc::new) })
            .await?;
        Ok(outcome.clone())
    }

    /// Number of distinct sources seen.
    pub async fn len(&self) -> usize {
        self.cells.lock().await.len()
    }

    /// Whether nothing has been cached yet.
    pub async fn is_empty(&self) -> bool {
        self.cells.lock().await.is_empty()
    }
}
