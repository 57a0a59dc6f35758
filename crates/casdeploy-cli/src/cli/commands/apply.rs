use anyhow::Context;
use casdeploy_core::parse_manifest;

use super::{context, output};
use crate::cli::args::{ApplyArgs, EngineArgs, OutputFormat};
use crate::exit_codes::{self, EXIT_SUCCESS};

/// Runs tasks in order and stops at the first failure. The exit code is that
/// of the failing task.
pub fn run(engine: &EngineArgs, args: ApplyArgs, format: OutputFormat) -> anyhow::Result<i32> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading manifest {}", args.file.display()))?;
    let tasks = parse_manifest(&content)
        .with_context(|| format!("parsing manifest {}", args.file.display()))?;
    let reconciler = context::reconciler(engine)?;

    let mut reports = Vec::with_capacity(tasks.len());
    let mut code = EXIT_SUCCESS;
    for task in &tasks {
        match reconciler.try_run_task(task) {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(task = task.name(), error = %e, "task failed");
                reports.push(casdeploy_core::TaskReport::from_error(&e));
                code = exit_codes::for_error(&e);
                break;
            }
        }
    }

    output::print_reports(&reports, format)?;
    Ok(code)
}
