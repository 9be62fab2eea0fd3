#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use glob::glob;
use which::which;

/// Finds and returns the path to javac binary
pub fn javac_path() -> Result<OsString> {
    which("javac")
        .map(PathBuf::into_os_string)
        .context("Cannot find a Java Compiler on path (javac)")
}

/// Finds and returns the path to java binary
pub fn java_path() -> Result<OsString> {
    which("java")
        .map(PathBuf::into_os_string)
        .context("Cannot find a Java runtime on path (java)")
}

/// Finds and returns the path to the docker CLI, used for container isolation
pub fn docker_path() -> Result<OsString> {
    which("docker")
        .map(PathBuf::into_os_string)
        .context("Cannot find a container runtime on path (docker)")
}

/// Finds and returns the path to bubblewrap, used for confined process isolation
pub fn bwrap_path() -> Result<OsString> {
    which("bwrap")
        .map(PathBuf::into_os_string)
        .context("Cannot find bubblewrap on path (bwrap), required by process isolation")
}

/// A glob utility function to find paths to files with certain extension
///
/// * `extension`: the file extension to find paths for
/// * `search_depth`: how many folders deep to search for
/// * `root_dir`: the root directory where search starts
pub fn find_files(extension: &str, search_depth: i8, root_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pattern = root_dir.to_path_buf();

    for _ in 0..search_depth {
        pattern.push("**");
    }

    pattern.push(format!("*.{extension}"));
    let pattern = pattern
        .to_str()
        .context("Could not convert root_dir to string")?
        .to_string();

    Ok(glob(&pattern)
        .context("Could not create glob")?
        .filter_map(Result::ok)
        .collect())
}

/// Expands a mix of file and directory paths into the Java sources they name.
///
/// Directories are searched a few levels deep; the result is sorted and
/// deduplicated so submissions are always graded in the same order.
pub fn java_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            sources.extend(find_files("java", 3, path)?);
        } else {
            sources.push(path.clone());
        }
    }
    sources.sort();
    sources.dedup();
    Ok(sources)
}
