use casdeploy_core::TaskReport;

use super::{context, output};
use crate::cli::args::{EngineArgs, OutputFormat};
use crate::exit_codes::EXIT_SUCCESS;

pub fn run(engine: &EngineArgs, format: OutputFormat) -> anyhow::Result<i32> {
    let reconciler = context::reconciler(engine)?;
    let report = TaskReport {
        facts: Some(reconciler.gather_facts()),
        ..TaskReport::default()
    };
    output::print_report(&report, format)?;
    Ok(EXIT_SUCCESS)
}
