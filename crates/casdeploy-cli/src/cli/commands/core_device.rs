use casdeploy_core::{CoreDescriptor, Scalar, TaskReport};

use super::{context, output};
use crate::cli::args::{CoreCmd, CoreSpecArgs, EngineArgs, OutputFormat};

pub fn run(engine: &EngineArgs, cmd: CoreCmd, format: OutputFormat) -> anyhow::Result<i32> {
    let reconciler = context::reconciler(engine)?;
    let result = match cmd {
        CoreCmd::Check(spec) => reconciler
            .check_core_config(&descriptor(&spec))
            .map(|()| TaskReport::default()),
        CoreCmd::Configure(spec) => reconciler
            .configure_core_device(&descriptor(&spec))
            .map(TaskReport::from_outcome),
    };
    output::finish(result, format)
}

fn descriptor(spec: &CoreSpecArgs) -> CoreDescriptor {
    CoreDescriptor {
        id: Some(Scalar::Int(spec.id)),
        cache_id: Some(Scalar::Int(spec.cache_id)),
        cached_volume: Some(spec.device.clone()),
        lazy_startup: Some(spec.lazy_startup),
    }
}
