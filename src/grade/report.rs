#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};

use super::results::{Finding, FindingRow, Report, Status};

/// Renders one report as a console table.
pub fn show_report(report: &Report) -> String {
    let rows: Vec<FindingRow> = report.findings.iter().map(FindingRow::from).collect();

    Table::new(&rows)
        .with(Panel::header(format!(
            "{} / {} ({})",
            report.submitter, report.exercise_id, report.rubric_id
        )))
        .with(Panel::footer(format!(
            "Total: {:.2}/{:.2}  ({} pass, {} fail, {} error)",
            report.points,
            report.max_points,
            report.count(Status::Pass),
            report.count(Status::Fail),
            report.count(Status::Error),
        )))
        .with(Modify::new(Rows::new(1..)).with(Width::wrap(24).keep_words(true)))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(
            Modify::new(Rows::last())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}

/// Renders bare findings, for checks that are not scored.
pub fn show_findings(title: &str, findings: &[Finding]) -> String {
    let rows: Vec<FindingRow> = findings.iter().map(FindingRow::from).collect();

    Table::new(&rows)
        .with(Panel::header(title))
        .with(Modify::new(Rows::new(1..)).with(Width::wrap(24).keep_words(true)))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}

/// One line of the batch summary.
#[derive(Tabled)]
struct SummaryRow {
    /// Who submitted.
    #[tabled(rename = "Submitter")]
    submitter: String,
    /// Exercise id.
    #[tabled(rename = "Exercise")]
    exercise:  String,
    /// Passed criteria.
    #[tabled(rename = "Pass")]
    pass:      String,
    /// Failed criteria.
    #[tabled(rename = "Fail")]
    fail:      String,
    /// Criteria in error.
    #[tabled(rename = "Error")]
    error:     String,
    /// Points earned.
    #[tabled(rename = "Points")]
    points:    String,
}

/// Renders one line per report.
pub fn show_summary(reports: &[Report]) -> String {
    let rows: Vec<SummaryRow> = reports
        .iter()
        .map(|r| SummaryRow {
            submitter: r.submitter.clone(),
            exercise:  r.exercise_id.clone(),
            pass:      r.count(Status::Pass).to_string(),
            fail:      r.count(Status::Fail).to_string(),
            error:     r.count(Status::Error).to_string(),
            points:    format!("{:.2}/{:.2}", r.points, r.max_points),
        })
        .collect();

    Table::new(&rows)
        .with(Panel::header("Grading Overview"))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}

/// Pretty JSON for a batch of reports.
pub fn to_json(reports: &[Report]) -> Result<String> {
    serde_json::to_string_pretty(reports).context("Could not serialize reports")
}
