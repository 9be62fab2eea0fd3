#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use glob::glob;

use crate::util::bwrap_path;

/// Where the workspace appears inside the jail.
pub const WORKDIR: &str = "/sandbox";

/// Host directories a JVM needs to start, mounted read-only when present.
const SYSTEM_MOUNTS: [&str; 10] = [
    "/usr",
    "/bin",
    "/sbin",
    "/lib",
    "/lib32",
    "/lib64",
    "/etc/alternatives",
    "/etc/ld.so.cache",
    "/etc/ld.so.conf",
    "/etc/ld.so.conf.d",
];

/// A `bwrap` command line that hides the host from a child process.
///
/// Every namespace is unshared, so the child has no network and cannot see
/// other processes. Nothing of the host filesystem is visible except
/// the system library directories, the JDK and the workspace, all read-only except the
/// workspace during compilation. `/tmp` is a private tmpfs.
#[derive(Debug, Clone)]
pub struct Jail {
    /// `bwrap`
    bwrap:  OsString,
    /// Read-only mounts, never the host root.
    mounts: Vec<PathBuf>,
}

impl Jail {
    /// A jail with the given read-only mounts. The host root is dropped
    /// from `mounts` if present.
    pub fn new(bwrap: impl Into<OsString>, mounts: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut mounts: Vec<PathBuf> = mounts
            .into_iter()
            .filter(|m| m.is_absolute() && m.parent().is_some())
            .collect();
        mounts.sort();
        mounts.dedup();

        Self {
            bwrap: bwrap.into(),
            mounts,
        }
    }

    /// Locates `bwrap` and the directories the JDK behind `tools` needs.
    pub fn locate(tools: &[&Path]) -> Result<Self> {
        let bwrap = bwrap_path()?;

        let mut mounts: Vec<PathBuf> = SYSTEM_MOUNTS.iter().map(PathBuf::from).collect();
        for tool in tools {
            mounts.push(jdk_home(tool)?);
        }
        // Debian keeps the JDK configuration under /etc/java-<version>
        mounts.extend(
            glob("/etc/java*")
                .context("Could not create glob")?
                .filter_map(Result::ok),
        );

        Ok(Self::new(bwrap, mounts))
    }

    /// `program args..` run inside the jail, with `workspace` as its
    /// working directory.
    pub fn wrap(
        &self,
        workspace: &Path,
        writable: bool,
        program: OsString,
        args: Vec<OsString>,
    ) -> (OsString, Vec<OsString>) {
        let mut argv = self.args(workspace, writable);
        argv.push(program);
        argv.extend(args);
        (self.bwrap.clone(), argv)
    }

    /// `bwrap` options, up to but excluding the confined command.
    pub fn args(&self, workspace: &Path, writable: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["--unshare-all", "--die-with-parent", "--new-session"]
            .map(OsString::from)
            .to_vec();

        for mount in &self.mounts {
            args.extend([
                OsString::from("--ro-bind-try"),
                mount.clone().into_os_string(),
                mount.clone().into_os_string(),
            ]);
        }

        args.extend(
            ["--tmpfs", "/tmp", "--proc", "/proc", "--dev", "/dev"].map(OsString::from),
        );
        let bind = if writable { "--bind" } else { "--ro-bind" };
        args.push(bind.into());
        args.push(workspace.as_os_str().to_owned());
        args.push(WORKDIR.into());
        args.extend(["--chdir", WORKDIR].map(OsString::from));
        args
    }
}

/// Resolves symlinks such as `/usr/bin/java -> /etc/alternatives/java`, so
/// the same path works inside the jail.
pub fn resolve(tool: &OsString) -> Result<OsString> {
    std::fs::canonicalize(tool)
        .map(PathBuf::into_os_string)
        .with_context(|| format!("Could not resolve {}", Path::new(tool).display()))
}

/// The JDK directory containing `bin/<tool>`.
fn jdk_home(tool: &Path) -> Result<PathBuf> {
    let tool = std::fs::canonicalize(tool).with_context(|| format!("Could not resolve {}", tool.display()))?;
    tool.parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .with_context(|| format!("{} is not inside a JDK", tool.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jail() -> Jail {
        Jail::new(
            "bwrap",
            ["/usr", "/", "/opt/jdk-21", "/usr"].map(PathBuf::from),
        )
    }

    /// Source paths of every bind mount in `args`.
    fn bound(args: &[OsString]) -> Vec<&OsString> {
        args.windows(2)
            .filter(|w| matches!(w[0].to_str(), Some("--ro-bind-try" | "--ro-bind" | "--bind")))
            .map(|w| &w[1])
            .collect()
    }

    #[test]
    fn the_host_root_is_never_mounted() {
        let args = jail().args(Path::new("/tmp/javagrader-1"), true);
        let bound = bound(&args);

        assert!(!bound.iter().any(|m| *m == "/"));
        assert_eq!(bound.iter().filter(|m| **m == "/usr").count(), 1);
        assert!(bound.iter().any(|m| *m == "/opt/jdk-21"));
    }

    #[test]
    fn no_network_and_a_private_tmp() {
        let args = jail().args(Path::new("/tmp/javagrader-1"), false);

        assert!(args.iter().any(|a| a == "--unshare-all"));
        assert!(args.iter().any(|a| a == "--die-with-parent"));
        assert!(
            args.windows(2)
                .any(|w| w[0] == "--tmpfs" && w[1] == "/tmp")
        );
    }

    #[test]
    fn the_workspace_is_writable_only_for_compilation() {
        let workspace = Path::new("/tmp/javagrader-1");
        let tail = |writable| {
            let args = jail().args(workspace, writable);
            args[args.len() - 5..].to_vec()
        };

        assert_eq!(
            tail(true),
            ["--bind", "/tmp/javagrader-1", WORKDIR, "--chdir", WORKDIR].map(OsString::from)
        );
        assert_eq!(tail(false)[0], "--ro-bind");
    }

    #[test]
    fn wrapped_command_follows_the_options() {
        let (program, argv) = jail().wrap(
            Path::new("/tmp/w"),
            false,
            "/opt/jdk-21/bin/java".into(),
            vec!["-cp".into(), ".".into(), "Main".into()],
        );

        assert_eq!(program, "bwrap");
        assert_eq!(
            argv[argv.len() - 4..],
            ["/opt/jdk-21/bin/java", "-cp", ".", "Main"].map(OsString::from)
        );
    }
}
