use casdeploy_core::{CacheDescriptor, Scalar, TaskReport};

use super::{context, output};
use crate::cli::args::{CacheCmd, CacheSpecArgs, EngineArgs, OutputFormat};

pub fn run(engine: &EngineArgs, cmd: CacheCmd, format: OutputFormat) -> anyhow::Result<i32> {
    let reconciler = context::reconciler(engine)?;
    let result = match cmd {
        CacheCmd::Check(spec) => reconciler
            .check_cache_config(&descriptor(&spec))
            .map(|()| TaskReport::default()),
        CacheCmd::Configure(spec) => reconciler
            .configure_cache_device(&descriptor(&spec))
            .map(TaskReport::from_outcome),
    };
    output::finish(result, format)
}

fn descriptor(spec: &CacheSpecArgs) -> CacheDescriptor {
    CacheDescriptor {
        cache_device: Some(spec.device.clone()),
        id: Some(Scalar::Int(spec.id)),
        cache_mode: Some(spec.mode.clone()),
        cleaning_policy: spec.cleaning_policy.clone(),
        promotion_policy: spec.promotion_policy.clone(),
        line_size: spec.line_size.map(|kib| Scalar::Int(i64::from(kib))),
        io_class: spec.io_class.clone(),
        force: Some(spec.force),
        lazy_startup: Some(spec.lazy_startup),
    }
}
