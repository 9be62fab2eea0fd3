#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use anyhow::{Context, Result};
use bon::Builder;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    time::timeout,
};
use tracing::debug;

/// Size of the chunks read from child pipes.
const READ_CHUNK: usize = 8 * 1024;

/// Drop guard that terminates a spawned child process if callers forget to
/// await it.
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> anyhow::Result<&mut Child> {
        self.0
            .as_mut()
            .context("child process already taken from guard")
    }

    /// Kills the child and waits for it so its resources are reclaimed.
    async fn kill_and_reap(&mut self) -> Result<()> {
        if let Some(mut child) = self.0.take() {
            // `kill` is a no-op error when the child has already exited.
            let _ = child.kill().await;
            child
                .wait()
                .await
                .context("failed to reap killed process")?;
        }
        Ok(())
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// How the collected process ended.
#[derive(Debug)]
pub enum Exit {
    /// The process exited on its own.
    Finished(ExitStatus),
    /// The wall-clock deadline expired; the process was killed and reaped.
    TimedOut,
    /// Stdout exceeded the configured ceiling; the process was killed and
    /// reaped.
    OutputLimit,
}

/// Captured result of a subprocess.
#[derive(Debug)]
pub struct Collected {
    /// How the process ended.
    pub exit:             Exit,
    /// Contents written to stdout, capped at the configured ceiling.
    pub stdout:           Vec<u8>,
    /// Contents written to stderr, capped at the configured ceiling.
    pub stderr:           Vec<u8>,
    /// Whether stdout was cut at the ceiling.
    pub stdout_truncated: bool,
}

/// Describes how stdin should be wired for the spawned process.
#[derive(Debug, Default)]
pub enum StdinSource {
    /// Attach nothing to stdin.
    #[default]
    Null,
    /// Write the provided bytes, then close stdin.
    Bytes(Vec<u8>),
}

/// A fully described subprocess invocation.
#[derive(Debug, Builder)]
pub struct Invocation {
    /// Program to execute.
    #[builder(into)]
    program:    OsString,
    /// Arguments passed to the program.
    #[builder(default)]
    args:       Vec<OsString>,
    /// Stdin wiring.
    #[builder(default)]
    stdin:      StdinSource,
    /// Working directory for the child.
    #[builder(into)]
    cwd:        Option<PathBuf>,
    /// Extra environment variables.
    #[builder(default)]
    env:        Vec<(OsString, OsString)>,
    /// Start from an empty environment instead of inheriting ours.
    #[builder(default)]
    clear_env:  bool,
    /// Wall-clock limit.
    deadline:   Option<Duration>,
    /// Stdout/stderr ceiling in bytes.
    max_output: Option<usize>,
}

/// Reads `reader` to the end, keeping at most `cap` bytes.
///
/// With `stop_at_cap` the read ends as soon as the cap is exceeded and the
/// returned flag is set; otherwise extra bytes are drained and discarded so
/// the writer never blocks on a full pipe.
async fn read_capped<R>(mut reader: R, cap: Option<usize>, stop_at_cap: bool) -> Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut truncated = false;

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .context("failed to read child pipe")?;
        if n == 0 {
            break;
        }

        match cap {
            Some(cap) if buf.len() + n > cap => {
                let room = cap.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..room]);
                truncated = true;
                if stop_at_cap {
                    break;
                }
            }
            _ if truncated => {}
            _ => buf.extend_from_slice(&chunk[..n]),
        }
    }

    Ok((buf, truncated))
}

/// What happened inside the deadline window.
enum Settled {
    /// Both pipes closed and the process exited.
    Exited(ExitStatus, Vec<u8>, Vec<u8>),
    /// Stdout overflowed before the process exited.
    Overflowed(Vec<u8>),
}

/// Spawns a command, optionally feeds stdin, and collects stdout/stderr.
///
/// The child is always dead and reaped by the time this returns, including
/// on timeout and on output overflow.
pub async fn run_collect(invocation: Invocation) -> Result<Collected> {
    let Invocation {
        program,
        args,
        stdin,
        cwd,
        env,
        clear_env,
        deadline,
        max_output,
    } = invocation;

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match &stdin {
        StdinSource::Null => {
            cmd.stdin(Stdio::null());
        }
        StdinSource::Bytes(_) => {
            cmd.stdin(Stdio::piped());
        }
    }

    if clear_env {
        cmd.env_clear();
    }
    if let Some(dir) = cwd.as_ref() {
        cmd.current_dir(dir);
    }
    for (key, value) in &env {
        cmd.env(key, value);
    }

    let mut guard = ChildDropGuard::new(
        cmd.spawn()
            .with_context(|| format!("failed to spawn process {}", program.to_string_lossy()))?,
    );

    if let StdinSource::Bytes(bytes) = stdin {
        if let Some(mut handle) = guard.child_mut()?.stdin.take() {
            tokio::spawn(async move {
                if !bytes.is_empty() {
                    let _ = handle.write_all(&bytes).await;
                }
                let _ = handle.shutdown().await;
            });
        }
    }

    let stdout = guard
        .child_mut()?
        .stdout
        .take()
        .context("missing stdout pipe")?;
    let stderr = guard
        .child_mut()?
        .stderr
        .take()
        .context("missing stderr pipe")?;

    let out_task = tokio::spawn(read_capped(stdout, max_output, true));
    let err_task = tokio::spawn(read_capped(stderr, max_output, false));
    let err_abort = err_task.abort_handle();

    let settle = async {
        let (stdout, overflowed) = out_task.await.context("stdout task join error")??;
        if overflowed {
            return Ok::<Settled, anyhow::Error>(Settled::Overflowed(stdout));
        }
        let status = guard
            .child_mut()?
            .wait()
            .await
            .context("failed to wait on process")?;
        let (stderr, _) = err_task.await.context("stderr task join error")??;
        Ok(Settled::Exited(status, stdout, stderr))
    };

    let settled = match deadline {
        Some(limit) => timeout(limit, settle).await.ok(),
        None => Some(settle.await),
    };

    match settled {
        Some(Ok(Settled::Exited(status, stdout, stderr))) => {
            guard.disarm();
            Ok(Collected {
                exit: Exit::Finished(status),
                stdout,
                stderr,
                stdout_truncated: false,
            })
        }
        Some(Ok(Settled::Overflowed(stdout))) => {
            debug!(bytes = stdout.len(), "stdout ceiling reached, killing process");
            guard.kill_and_reap().await?;
            err_abort.abort();
            Ok(Collected {
                exit: Exit::OutputLimit,
                stdout,
                stderr: Vec::new(),
                stdout_truncated: true,
            })
        }
        Some(Err(e)) => {
            guard.kill_and_reap().await?;
            err_abort.abort();
            Err(e)
        }
        None => {
            debug!("deadline expired, killing process");
            guard.kill_and_reap().await?;
            err_abort.abort();
            Ok(Collected {
                exit: Exit::TimedOut,
                stdout: Vec::new(),
                stderr: Vec::new(),
                stdout_truncated: false,
            })
        }
    }
}
