#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt, str::FromStr, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};
use state::InitCell;

/// How sandboxed programs are isolated from the grading process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// A throwaway container with no network, memory/CPU/pid ceilings, and
    /// only the temporary directory mounted.
    #[default]
    Container,
    /// A host JDK run under `bwrap`: fresh namespaces with no network, the
    /// system and JDK directories mounted read-only, and only the
    /// workspace visible besides them.
    Process,
    /// A plain host child process with a cleared environment. Submissions
    /// can see the host filesystem and network; only for trusted code.
    Unconfined,
}

impl FromStr for Isolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" | "docker" => Ok(Isolation::Container),
            "process" | "bwrap" => Ok(Isolation::Process),
            "unconfined" | "none" => Ok(Isolation::Unconfined),
            other => Err(format!("unknown isolation mode `{other}`")),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Container => f.write_str("container"),
            Isolation::Process => f.write_str("process"),
            Isolation::Unconfined => f.write_str("unconfined"),
        }
    }
}

/// Limits and tuning knobs shared by the sandbox, the runner and the
/// orchestrator.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct GraderConfig {
    /// Maximum time allowed for a javac invocation.
    #[builder(default = Duration::from_secs(30))]
    javac_timeout:              Duration,
    /// Default wall-clock limit for one behavioral test case.
    #[builder(default = Duration::from_millis(2000))]
    run_timeout:                Duration,
    /// Heap ceiling handed to the JVM (and the container), in megabytes.
    #[builder(default = 256)]
    max_memory_mb:              u64,
    /// CPU-seconds ceiling for one sandboxed run.
    #[builder(default = 5)]
    max_cpu_secs:               u64,
    /// Bytes of stdout kept before a run is cut off and flagged.
    #[builder(default = 64 * 1024)]
    max_output_bytes:           usize,
    /// Upper bound on simultaneously running sandboxed processes.
    #[builder(default = default_parallelism())]
    max_concurrent_sandboxes:   usize,
    /// Upper bound on submissions graded at the same time by `grade_all`.
    #[builder(default = 4)]
    max_concurrent_submissions: usize,
    /// Isolation mode used by the JVM sandbox.
    #[builder(default)]
    isolation:                  Isolation,
    /// Image used in container isolation mode.
    #[builder(default = String::from("eclipse-temurin:21-jdk"), into)]
    container_image:            String,
}

impl Default for GraderConfig {
    fn default() -> Self {
        GraderConfig::builder().build()
    }
}

impl GraderConfig {
    /// Reads the configuration from `JAVAGRADER_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = GraderConfig::default();

        GraderConfig {
            javac_timeout:              read_duration(
                "JAVAGRADER_JAVAC_TIMEOUT_SECS",
                Duration::from_secs,
                defaults.javac_timeout,
            ),
            run_timeout:                read_duration(
                "JAVAGRADER_RUN_TIMEOUT_MS",
                Duration::from_millis,
                defaults.run_timeout,
            ),
            max_memory_mb:              read_var("JAVAGRADER_MAX_MEMORY_MB")
                .unwrap_or(defaults.max_memory_mb),
            max_cpu_secs:               read_var("JAVAGRADER_MAX_CPU_SECS")
                .unwrap_or(defaults.max_cpu_secs),
            max_output_bytes:           read_var("JAVAGRADER_MAX_OUTPUT_BYTES")
                .unwrap_or(defaults.max_output_bytes),
            max_concurrent_sandboxes:   read_var::<usize>("JAVAGRADER_MAX_SANDBOXES")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_sandboxes),
            max_concurrent_submissions: read_var::<usize>("JAVAGRADER_MAX_SUBMISSIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_submissions),
            isolation:                  read_var("JAVAGRADER_ISOLATION")
                .unwrap_or(defaults.isolation),
            container_image:            std::env::var("JAVAGRADER_CONTAINER_IMAGE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.container_image),
        }
    }

    /// Returns the configured javac timeout.
    pub fn javac_timeout(&self) -> Duration {
        self.javac_timeout
    }

    /// Returns the default per-test-case timeout.
    pub fn run_timeout(&self) -> Duration {
        self.run_timeout
    }

    /// Returns the heap ceiling in megabytes.
    pub fn max_memory_mb(&self) -> u64 {
        self.max_memory_mb
    }

    /// Returns the CPU-seconds ceiling.
    pub fn max_cpu_secs(&self) -> u64 {
        self.max_cpu_secs
    }

    /// Returns the stdout ceiling in bytes.
    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Returns the sandbox concurrency ceiling (never zero).
    pub fn max_concurrent_sandboxes(&self) -> usize {
        self.max_concurrent_sandboxes.max(1)
    }

    /// Returns the submission concurrency ceiling (never zero).
    pub fn max_concurrent_submissions(&self) -> usize {
        self.max_concurrent_submissions.max(1)
    }

    /// Returns the isolation mode.
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Returns the container image used in container mode.
    pub fn container_image(&self) -> &str {
        &self.container_image
    }
}

/// Process-wide configuration, read from the environment on first use.
static CONFIG: InitCell<GraderConfig> = InitCell::new();

/// Returns the process-wide configuration, initializing it on demand.
pub fn get() -> &'static GraderConfig {
    CONFIG.get_or_init(GraderConfig::from_env)
}

/// Number of sandboxes allowed to run at once when nothing is configured.
fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

/// Parses an environment variable, returning `None` when it is missing or
/// does not parse.
fn read_var<T: FromStr>(env: &str) -> Option<T> {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

/// Parses an integer environment variable into a `Duration` using `unit`,
/// falling back to `default` when parsing fails or the variable is missing.
fn read_duration(env: &str, unit: fn(u64) -> Duration, default: Duration) -> Duration {
    read_var::<u64>(env).map(unit).unwrap_or(default)
}
