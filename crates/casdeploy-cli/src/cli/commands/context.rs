//! Engine setup shared by all commands.

use anyhow::Context;
use casdeploy_core::{Casadm, EngineConfig, Reconciler};

use crate::cli::args::EngineArgs;

/// Config file first, then flags and environment on top.
pub fn engine_config(args: &EngineArgs) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(path) = &args.registry {
        config.registry_path = path.clone();
    }
    if let Some(dir) = &args.ioclass_dir {
        config.ioclass_dir = dir.clone();
    }
    if let Some(bin) = &args.casadm {
        config.casadm_path = bin.clone();
    }
    if let Some(strict) = args.strict_devices {
        config.strict_devices = strict;
    }

    tracing::debug!(
        registry = %config.registry_path.display(),
        casadm = %config.casadm_path.display(),
        strict_devices = config.strict_devices,
        "engine config"
    );
    Ok(config)
}

pub fn reconciler(args: &EngineArgs) -> anyhow::Result<Reconciler<Casadm>> {
    let config = engine_config(args)?;
    let casadm = Casadm::new(&config.casadm_path);
    Ok(Reconciler::new(config, casadm))
}
