//! Rendering of task reports.

use casdeploy_core::{CasResult, TaskReport};

use crate::cli::args::OutputFormat;
use crate::exit_codes::{self, EXIT_SUCCESS};

/// Print the result of a single operation and return the exit code.
pub(crate) fn finish(result: CasResult<TaskReport>, format: OutputFormat) -> anyhow::Result<i32> {
    let (report, code) = match result {
        Ok(report) => (report, EXIT_SUCCESS),
        Err(e) => (TaskReport::from_error(&e), exit_codes::for_error(&e)),
    };
    print_report(&report, format)?;
    Ok(code)
}

pub(crate) fn print_report(report: &TaskReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print_text(report)?,
    }
    Ok(())
}

pub(crate) fn print_reports(reports: &[TaskReport], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reports)?),
        OutputFormat::Text => {
            for report in reports {
                print_text(report)?;
            }
        }
    }
    Ok(())
}

fn print_text(report: &TaskReport) -> anyhow::Result<()> {
    if let Some(msg) = &report.msg {
        eprintln!("error: {}", msg);
        return Ok(());
    }
    if let Some(facts) = &report.facts {
        print!("{}", serde_yaml::to_string(facts)?);
        return Ok(());
    }
    println!("{}", if report.changed { "changed" } else { "ok" });
    Ok(())
}
