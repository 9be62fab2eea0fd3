#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    future::Future,
    path::Path,
    process::ExitStatus,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, anyhow};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    CompileFailure,
    CompileOutcome,
    CompiledArtifact,
    ExecutionResult,
    Sandbox,
    SandboxError,
    jail::{self, Jail, WORKDIR},
};
use crate::{
    config::{self, GraderConfig, Isolation},
    java::{
        Parser,
        parsers::{javac_diagnostics, parser as java_parser, stacktrace_line_refs},
        queries::{CLASSNAME_QUERY, PUBLIC_CLASS_QUERY},
    },
    process::{Collected, Exit, Invocation, StdinSource, run_collect},
    util::{docker_path, java_path, javac_path},
};

/// How long `docker kill` may take when cleaning up.
const CONTAINER_KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Executables the sandbox launches.
#[derive(Debug, Clone)]
enum Toolchain {
    /// A JDK on the host, launched as child processes.
    Local {
        /// `javac`
        javac: OsString,
        /// `java`
        java:  OsString,
        /// `sh`, used to apply a CPU-time ceiling; runs unwrapped without it.
        shell: Option<OsString>,
        /// Confinement, absent only in unconfined mode.
        jail:  Option<Jail>,
    },
    /// A JDK inside a throwaway container.
    Container {
        /// `docker`
        docker: OsString,
    },
}

/// Compiles with `javac` and runs with `java`, one private workspace per
/// compilation, never more than `max_concurrent_sandboxes` processes at
/// once.
#[derive(Debug, Clone)]
pub struct JvmSandbox {
    /// Limits applied to every process.
    config:    GraderConfig,
    /// What to launch.
    toolchain: Toolchain,
    /// Global ceiling on simultaneously running processes.
    permits:   Arc<Semaphore>,
}

impl JvmSandbox {
    /// Locates the toolchain required by `config.isolation()`.
    pub fn new(config: GraderConfig) -> Result<Self, SandboxError> {
        let toolchain = match config.isolation() {
            Isolation::Container => Toolchain::Container {
                docker: docker_path().map_err(SandboxError::Unavailable)?,
            },
            Isolation::Process => {
                let javac = javac_path().and_then(|p| jail::resolve(&p));
                let java = java_path().and_then(|p| jail::resolve(&p));
                let (javac, java) = (
                    javac.map_err(SandboxError::Unavailable)?,
                    java.map_err(SandboxError::Unavailable)?,
                );
                let jail =
                    Jail::locate(&[Path::new(&javac), Path::new(&java)]).map_err(SandboxError::Unavailable)?;
                debug!(?jail, "process isolation");

                Toolchain::Local {
                    javac,
                    java,
                    shell: which::which("sh").ok().map(|p| p.into_os_string()),
                    jail: Some(jail),
                }
            }
            Isolation::Unconfined => {
                warn!("unconfined isolation: submissions can reach the host filesystem and network");
                Toolchain::Local {
                    javac: javac_path().map_err(SandboxError::Unavailable)?,
                    java:  java_path().map_err(SandboxError::Unavailable)?,
                    shell: which::which("sh").ok().map(|p| p.into_os_string()),
                    jail:  None,
                }
            }
        };
        let permits = Arc::new(Semaphore::new(config.max_concurrent_sandboxes()));

        Ok(Self {
            config,
            toolchain,
            permits,
        })
    }

    /// A sandbox using the process-wide configuration.
    pub fn from_env() -> Result<Self, SandboxError> {
        Self::new(config::get().clone())
    }

    /// Configuration in use.
    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Waits for a free sandbox slot.
    async fn permit(&self) -> Result<SemaphorePermit<'_>, SandboxError> {
        self.permits
            .acquire()
            .await
            .context("sandbox semaphore closed")
            .map_err(SandboxError::Failure)
    }

    /// `docker run` prefix shared by compilation and execution.
    fn docker_args(&self, dir: &Path, name: &str, read_only: bool, interactive: bool) -> Vec<OsString> {
        let mut mount = OsString::from(dir.as_os_str());
        mount.push(format!(":{WORKDIR}"));
        if read_only {
            mount.push(":ro");
        }

        let mut args: Vec<OsString> = vec!["run".into(), "--rm".into()];
        if interactive {
            args.push("-i".into());
        }
        args.extend(
            [
                "--network=none".to_string(),
                format!("--memory={}m", self.config.max_memory_mb() * 2),
                "--cpus=1".to_string(),
                "--pids-limit=128".to_string(),
                format!("--ulimit=cpu={}", self.config.max_cpu_secs()),
                format!("--name={name}"),
                "-w".to_string(),
                WORKDIR.to_string(),
                "-v".to_string(),
            ]
            .map(OsString::from),
        );
        args.push(mount);
        args.push(self.config.container_image().into());
        args
    }

    /// JVM flags applied to every run.
    fn jvm_flags(&self) -> Vec<OsString> {
        [
            format!("-Xmx{}m", self.config.max_memory_mb()),
            "-Xss16m".to_string(),
            "-XX:+UseSerialGC".to_string(),
            "-XX:TieredStopAtLevel=1".to_string(),
            "-Duser.language=en".to_string(),
            "-Dfile.encoding=UTF-8".to_string(),
        ]
        .map(OsString::from)
        .to_vec()
    }

    /// Minimal environment for child processes.
    fn child_env() -> Vec<(OsString, OsString)> {
        std::env::var_os("PATH")
            .map(|path| vec![(OsString::from("PATH"), path)])
            .unwrap_or_default()
    }

    /// Builds the javac invocation for `file_name` inside `dir`.
    fn javac_invocation(&self, dir: &Path, file_name: &str, container: &str) -> Invocation {
        let javac_args: Vec<OsString> = ["-J-Duser.language=en", "-encoding", "UTF-8", "-d", ".", file_name]
            .map(OsString::from)
            .to_vec();

        let (program, args) = match &self.toolchain {
            Toolchain::Local { javac, jail: None, .. } => (javac.clone(), javac_args),
            Toolchain::Local {
                javac, jail: Some(jail), ..
            } => jail.wrap(dir, true, javac.clone(), javac_args),
            Toolchain::Container { docker } => {
                let mut args = self.docker_args(dir, container, false, false);
                args.push("javac".into());
                args.extend(javac_args);
                (docker.clone(), args)
            }
        };

        Invocation::builder()
            .program(program)
            .args(args)
            .cwd(dir.to_path_buf())
            .env(Self::child_env())
            .clear_env(true)
            .deadline(self.config.javac_timeout())
            .max_output(self.config.max_output_bytes())
            .build()
    }

    /// Builds the java invocation for `artifact`.
    fn java_invocation(
        &self,
        artifact: &CompiledArtifact,
        input: &str,
        args: &[String],
        timeout: Duration,
        container: &str,
    ) -> Invocation {
        let mut java_args = self.jvm_flags();
        java_args.extend(["-cp", ".", artifact.main_class()].map(OsString::from));
        java_args.extend(args.iter().map(OsString::from));

        let (program, argv) = match &self.toolchain {
            Toolchain::Local { java, shell, jail, .. } => {
                let (program, argv) = match shell {
                    Some(shell) => {
                        let script = format!("ulimit -t {}; exec \"$0\" \"$@\"", self.config.max_cpu_secs());
                        let mut argv: Vec<OsString> = vec!["-c".into(), script.into(), java.clone()];
                        argv.extend(java_args);
                        (shell.clone(), argv)
                    }
                    None => (java.clone(), java_args),
                };
                match jail {
                    Some(jail) => jail.wrap(artifact.dir(), false, program, argv),
                    None => (program, argv),
                }
            }
            Toolchain::Container { docker } => {
                let mut argv = self.docker_args(artifact.dir(), container, true, true);
                argv.push("java".into());
                argv.extend(java_args);
                (docker.clone(), argv)
            }
        };

        Invocation::builder()
            .program(program)
            .args(argv)
            .stdin(StdinSource::Bytes(input.as_bytes().to_vec()))
            .cwd(artifact.dir().to_path_buf())
            .env(Self::child_env())
            .clear_env(true)
            .deadline(timeout)
            .max_output(self.config.max_output_bytes())
            .build()
    }

    /// Runs `invocation` while holding a sandbox slot.
    async fn supervised(&self, invocation: Invocation) -> Result<Collected, SandboxError> {
        let _permit = self.permit().await?;
        run_collect(invocation).await.map_err(SandboxError::Failure)
    }

    /// Makes sure a container outlives neither its deadline nor its output
    /// ceiling. Killing the docker client alone does not stop the container.
    async fn reap_container(&self, name: &str) {
        let Toolchain::Container { docker } = &self.toolchain else {
            return;
        };
        let kill = Invocation::builder()
            .program(docker.clone())
            .args(vec!["kill".into(), name.into()])
            .deadline(CONTAINER_KILL_TIMEOUT)
            .build();
        if let Err(e) = run_collect(kill).await {
            warn!(container = name, "could not kill container: {e:#}");
        }
    }

    /// Recognizes an isolation layer that could not start, as opposed to
    /// the JDK tool failing inside it.
    fn launch_failure(&self, status: ExitStatus, stderr: &str) -> Option<SandboxError> {
        let layer = match &self.toolchain {
            // docker's own exit codes
            Toolchain::Container { .. } if matches!(status.code(), Some(125..=127)) => "container",
            Toolchain::Local { jail: Some(_), .. } if stderr.trim_start().starts_with("bwrap:") => "bwrap",
            _ => return None,
        };
        Some(SandboxError::Unavailable(anyhow!("{layer} failed to start: {}", stderr.trim())))
    }

    /// Compiles `source` in a fresh workspace.
    #[instrument(skip_all, fields(bytes = source.len()))]
    async fn compile_source(&self, source: &str) -> Result<CompileOutcome, SandboxError> {
        let main_class = main_class_name(source);
        let workspace = tempfile::Builder::new()
            .prefix("javagrader-")
            .tempdir()
            .context("Could not create a compilation workspace")
            .map_err(SandboxError::Failure)?;

        let file_name = format!("{main_class}.java");
        tokio::fs::write(workspace.path().join(&file_name), source)
            .await
            .with_context(|| format!("Could not write {file_name}"))
            .map_err(SandboxError::Failure)?;

        let container = format!("javagrader-{}", Uuid::new_v4());
        let collected = self
            .supervised(self.javac_invocation(workspace.path(), &file_name, &container))
            .await?;

        match collected.exit {
            Exit::TimedOut => {
                self.reap_container(&container).await;
                warn!(class = %main_class, "javac timed out");
                Ok(CompileOutcome::Rejected(CompileFailure {
                    output:      format!(
                        "compilation timed out after {}s",
                        self.config.javac_timeout().as_secs()
                    ),
                    diagnostics: Vec::new(),
                }))
            }
            Exit::OutputLimit => {
                self.reap_container(&container).await;
                let output = String::from_utf8_lossy(&collected.stdout).to_string();
                Ok(CompileOutcome::Rejected(CompileFailure {
                    diagnostics: javac_diagnostics(&output),
                    output,
                }))
            }
            Exit::Finished(status) if status.success() => {
                debug!(class = %main_class, "compiled");
                Ok(CompileOutcome::Compiled(CompiledArtifact::in_workspace(main_class, workspace)))
            }
            Exit::Finished(status) => {
                let stderr = String::from_utf8_lossy(&collected.stderr);
                let stdout = String::from_utf8_lossy(&collected.stdout);
                if let Some(e) = self.launch_failure(status, &stderr) {
                    return Err(e);
                }

                let output = format!("{stderr}{stdout}");
                debug!(class = %main_class, "javac rejected the source");
                Ok(CompileOutcome::Rejected(CompileFailure {
                    diagnostics: javac_diagnostics(&output),
                    output,
                }))
            }
        }
    }

    /// Runs a compiled artifact once.
    #[instrument(skip_all, fields(class = artifact.main_class(), timeout_ms = timeout.as_millis() as u64))]
    async fn run_artifact(
        &self,
        artifact: &CompiledArtifact,
        input: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        let container = format!("javagrader-{}", Uuid::new_v4());
        let collected = self
            .supervised(self.java_invocation(artifact, input, args, timeout, &container))
            .await?;

        match collected.exit {
            Exit::TimedOut => {
                self.reap_container(&container).await;
                warn!("run exceeded {} ms", timeout.as_millis());
                Ok(ExecutionResult::Timeout { limit: timeout })
            }
            Exit::OutputLimit => {
                self.reap_container(&container).await;
                warn!(bytes = collected.stdout.len(), "run hit the output ceiling");
                Ok(ExecutionResult::Completed {
                    stdout:    String::from_utf8_lossy(&collected.stdout).to_string(),
                    exit_code: None,
                    truncated: true,
                })
            }
            Exit::Finished(status) if status.success() => Ok(ExecutionResult::Completed {
                stdout:    String::from_utf8_lossy(&collected.stdout).to_string(),
                exit_code: status.code(),
                truncated: collected.stdout_truncated,
            }),
            Exit::Finished(status) => {
                let stderr = String::from_utf8_lossy(&collected.stderr).to_string();
                if let Some(e) = self.launch_failure(status, &stderr) {
                    return Err(e);
                }
                Ok(ExecutionResult::RuntimeFault {
                    exit_code:  status.code(),
                    diagnostic: fault_summary(&stderr, status),
                    line_refs:  stacktrace_line_refs(&stderr),
                })
            }
        }
    }
}

impl Sandbox for JvmSandbox {
    fn compile(&self, source: &str) -> impl Future<Output = Result<CompileOutcome, SandboxError>> + Send {
        self.compile_source(source)
    }

    fn run(
        &self,
        artifact: &CompiledArtifact,
        input: &str,
        args: &[String],
        timeout: Duration,
    ) -> impl Future<Output = Result<ExecutionResult, SandboxError>> + Send {
        self.run_artifact(artifact, input, args, timeout)
    }
}

/// Name of the class the source file must be named after: the public
/// top-level class, else the first top-level class, else `Main`.
pub fn main_class_name(source: &str) -> String {
    let Ok(parser) = Parser::new(source.to_owned()) else {
        return "Main".to_string();
    };

    [PUBLIC_CLASS_QUERY, CLASSNAME_QUERY]
        .iter()
        .find_map(|q| {
            parser
                .query(q)
                .ok()?
                .into_iter()
                .find_map(|m| m.get("name").cloned())
        })
        .filter(|name| is_java_identifier(name))
        .unwrap_or_else(|| "Main".to_string())
}

/// Whether `name` is safe to use as a class and file name.
fn is_java_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// One-line description of an abnormal exit.
fn fault_summary(stderr: &str, status: ExitStatus) -> String {
    if let Some(header) = stderr
        .lines()
        .find_map(|line| java_parser::uncaught_exception(line).ok())
    {
        return header;
    }

    if let Some(line) = stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
    {
        return line.to_string();
    }

    match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => signal_summary(status),
    }
}

/// Describes a signal-terminated process.
#[cfg(unix)]
fn signal_summary(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        // SIGKILL / SIGXCPU: the CPU-time ceiling
        Some(9) | Some(24) => "killed after exceeding the CPU-time limit".to_string(),
        Some(signal) => format!("terminated by signal {signal}"),
        None => "terminated abnormally".to_string(),
    }
}

/// Describes a signal-terminated process.
#[cfg(not(unix))]
fn signal_summary(_status: ExitStatus) -> String {
    "terminated abnormally".to_string()
}
