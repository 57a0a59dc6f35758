use casdeploy_core::TaskReport;

use super::{context, output};
use crate::cli::args::{EngineArgs, OutputFormat, StopArgs};

pub fn run(engine: &EngineArgs, args: StopArgs, format: OutputFormat) -> anyhow::Result<i32> {
    let reconciler = context::reconciler(engine)?;
    let result = reconciler
        .stop_devices(args.flush)
        .map(TaskReport::from_outcome);
    output::finish(result, format)
}
