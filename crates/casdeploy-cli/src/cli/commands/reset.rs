use casdeploy_core::TaskReport;

use super::{context, output};
use crate::cli::args::{EngineArgs, OutputFormat};

pub fn run(engine: &EngineArgs, format: OutputFormat) -> anyhow::Result<i32> {
    let reconciler = context::reconciler(engine)?;
    let result = reconciler
        .reset_configuration()
        .map(TaskReport::from_outcome);
    output::finish(result, format)
}
