#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # javagrader
//!
//! Grades Java exercises against a JSON rubric.
//!
//! ```text
//! javagrader grade --rubric validation.json submissions/
//! javagrader check --rubric validation.json Validation.java
//! javagrader extract Validation.java
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use bpaf::*;
use dotenvy::dotenv;
use javagrader::{
    Grader, JvmSandbox, Rubric, Submission, config, extract,
    grade::{check, show_findings, show_report, show_summary, to_json},
    util::java_sources,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade submissions
    Grade {
        /// Rubric file
        rubric:    PathBuf,
        /// Submitter name for a single file; several files are named by stem
        submitter: Option<String>,
        /// Where to write the JSON reports
        json:      Option<PathBuf>,
        /// Files or directories
        paths:     Vec<PathBuf>,
    },
    /// Structural checks only
    Check {
        /// Rubric file
        rubric: PathBuf,
        /// Java file
        file:   PathBuf,
    },
    /// Print the structural model
    Extract {
        /// Class signatures are expected on
        class: Option<String>,
        /// Java file
        file:  PathBuf,
    },
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Opts {
    /// Debug logging
    verbose: bool,
    /// What to do
    cmd:     Cmd,
}

/// Parse the command line arguments and return the options
fn options() -> Opts {
    /// parses the rubric path
    fn r() -> impl Parser<PathBuf> {
        long("rubric")
            .short('r')
            .help("Path to a JSON rubric")
            .argument::<PathBuf>("RUBRIC")
    }

    /// parses one java file name
    fn f() -> impl Parser<PathBuf> {
        positional::<PathBuf>("FILE").help("Java source file")
    }

    let rubric = r();
    let submitter = long("submitter")
        .short('s')
        .help("Name recorded as the submitter when grading a single file (defaults to the file stem)")
        .argument::<String>("NAME")
        .optional();
    let json = long("json")
        .help("Write the reports as JSON to this file (`-` for stdout)")
        .argument::<PathBuf>("OUT")
        .optional();
    let paths = positional::<PathBuf>("PATH")
        .help("Java files or directories containing them")
        .some("at least one submission is required");
    let grade = construct!(Cmd::Grade {
        rubric,
        submitter,
        json,
        paths
    })
    .to_options()
    .command("grade")
    .help("Grade submissions against a rubric");

    let rubric = r();
    let file = f();
    let check = construct!(Cmd::Check { rubric, file })
        .to_options()
        .command("check")
        .help("Run only the structural criteria of a rubric");

    let class = long("class")
        .short('c')
        .help("Expected primary class")
        .argument::<String>("NAME")
        .optional();
    let file = f();
    let extract = construct!(Cmd::Extract { class, file })
        .to_options()
        .command("extract")
        .help("Print the structural model of a file as JSON");

    let verbose = short('v')
        .long("verbose")
        .help("Log debug output")
        .switch();
    let cmd = construct!([grade, check, extract]);

    construct!(Opts { verbose, cmd })
        .to_options()
        .descr("Rubric-driven grader for Java exercises")
        .run()
}

/// Grades every Java file under `paths`.
async fn grade(rubric: PathBuf, submitter: Option<String>, json: Option<PathBuf>, paths: Vec<PathBuf>) -> Result<()> {
    let rubric = Arc::new(Rubric::from_path(&rubric)?);
    let submissions = Submission::from_paths(&java_sources(&paths)?, &rubric.id, submitter.as_deref())?;
    if submissions.is_empty() {
        bail!("No Java sources found");
    }

    let config = config::get().clone();
    let grader = Grader::new(JvmSandbox::new(config.clone())?, config);
    let reports = grader.grade_all(&submissions, &rubric).await?;

    for report in &reports {
        println!("{}", show_report(report));
    }
    if reports.len() > 1 {
        println!("{}", show_summary(&reports));
    }

    match json {
        Some(out) if out.as_os_str() == "-" => println!("{}", to_json(&reports)?),
        Some(out) => std::fs::write(&out, to_json(&reports)?)
            .with_context(|| format!("Could not write {}", out.display()))?,
        None => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let opts = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(if opts.verbose { Level::DEBUG } else { Level::INFO });
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match opts.cmd {
        Cmd::Grade {
            rubric,
            submitter,
            json,
            paths,
        } => grade(rubric, submitter, json, paths).await?,
        Cmd::Check { rubric, file } => {
            let rubric = Rubric::from_path(&rubric)?;
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Could not read {}", file.display()))?;
            let model = extract(&source, rubric.expected_class.as_deref())?;
            let findings = check(&model, &rubric);
            println!("{}", show_findings(&file.display().to_string(), &findings));
        }
        Cmd::Extract { class, file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Could not read {}", file.display()))?;
            let model = extract(&source, class.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&model)?);
        }
    };

    Ok(())
}
