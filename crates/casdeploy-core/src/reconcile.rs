//! Write/apply/rollback transactions against the registry and the live subsystem.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::control::{ControlPlane, ControlPlaneError};
use crate::descriptor::{CacheDescriptor, CacheRequest, CoreDescriptor};
use crate::error::{CasError, CasResult};
use crate::ioclass::IoClassPolicy;
use crate::registry::{Insertion, Registry, RegistryFile, RegistrySnapshot};
use crate::types::CoreConfig;

/// Result of a mutating operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub changed: bool,
}

impl Outcome {
    pub const CHANGED: Outcome = Outcome { changed: true };
    pub const UNCHANGED: Outcome = Outcome { changed: false };
}

/// Drives desired state into the registry and the live subsystem.
pub struct Reconciler<C> {
    config: EngineConfig,
    registry: RegistryFile,
    control: C,
}

impl<C: ControlPlane> Reconciler<C> {
    pub fn new(config: EngineConfig, control: C) -> Self {
        let registry = RegistryFile::new(&config.registry_path);
        Self {
            config,
            registry,
            control,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry_file(&self) -> &RegistryFile {
        &self.registry
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Validate a cache request without touching the registry or the subsystem.
    pub fn check_cache_config(&self, descriptor: &CacheDescriptor) -> CasResult<()> {
        self.resolve_cache(descriptor).map(|_| ())
    }

    /// Validate a core request without touching the registry or the subsystem.
    pub fn check_core_config(&self, descriptor: &CoreDescriptor) -> CasResult<()> {
        self.resolve_core(descriptor).map(|_| ())
    }

    pub fn configure_cache_device(&self, descriptor: &CacheDescriptor) -> CasResult<Outcome> {
        let request = self.resolve_cache(descriptor)?;
        let cache = &request.config;
        debug!(cache_id = cache.cache_id, device = %cache.device.display(), "configuring cache");

        self.transact(
            &format!("cache {}", cache.cache_id),
            |registry| registry.insert_cache(cache.clone()),
            || self.control.is_cache_active(cache),
            || {
                self.control.start_cache(cache, false, request.force)?;
                self.control.configure_cache(cache)
            },
        )
    }

    pub fn configure_core_device(&self, descriptor: &CoreDescriptor) -> CasResult<Outcome> {
        let core = self.resolve_core(descriptor)?;
        debug!(
            cache_id = core.cache_id,
            core_id = core.core_id,
            device = %core.device.display(),
            "configuring core"
        );

        self.transact(
            &format!("core {}-{}", core.cache_id, core.core_id),
            |registry| registry.insert_core(core.clone()),
            || self.control.is_core_attached(&core),
            || self.control.attach_core(&core, false),
        )
    }

    /// Stop every running cache with its cores.
    pub fn stop_devices(&self, flush: bool) -> CasResult<Outcome> {
        let before = self.control.live_device_count()?;
        if before == 0 {
            debug!("no devices running");
            return Ok(Outcome::UNCHANGED);
        }

        info!(devices = before, flush, "stopping devices");
        self.control.stop_all(flush)?;

        let remaining = self.control.live_device_count()?;
        if remaining != 0 {
            return Err(CasError::NotAllStopped { remaining });
        }
        Ok(Outcome::CHANGED)
    }

    /// Empty the registry, keeping its version tag.
    pub fn reset_configuration(&self) -> CasResult<Outcome> {
        let snapshot = match self.registry.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(error = %e, "nothing to reset");
                return Ok(Outcome::UNCHANGED);
            }
        };
        if snapshot.registry().is_empty() {
            return Ok(Outcome::UNCHANGED);
        }

        let empty = Registry::reset(snapshot.registry().version_tag.clone());
        self.registry.write(&empty)?;
        info!(path = %self.registry.path().display(), "configuration reset");
        Ok(Outcome::CHANGED)
    }

    fn resolve_cache(&self, descriptor: &CacheDescriptor) -> CasResult<CacheRequest> {
        let request = descriptor.resolve(&self.config.ioclass_dir)?;
        request.config.validate()?;
        if self.config.strict_devices {
            check_block_device(&request.config.device)?;
        }
        if let Some(file) = &request.config.ioclass_file {
            let policy = IoClassPolicy::from_file(file)?;
            debug!(policy = policy.name(), rules = policy.len(), "io class policy valid");
        }
        Ok(request)
    }

    fn resolve_core(&self, descriptor: &CoreDescriptor) -> CasResult<CoreConfig> {
        let core = descriptor.resolve()?;
        core.validate()?;
        if self.config.strict_devices {
            check_block_device(&core.device)?;
        }
        Ok(core)
    }

    fn transact<I, Q, A>(&self, what: &str, insert: I, is_live: Q, apply: A) -> CasResult<Outcome>
    where
        I: FnOnce(&mut Registry) -> Insertion,
        Q: FnOnce() -> Result<bool, ControlPlaneError>,
        A: FnOnce() -> Result<(), ControlPlaneError>,
    {
        let snapshot = self.registry.load()?;
        let mut registry = snapshot.registry().clone();

        let persisted = match insert(&mut registry) {
            Insertion::Inserted => {
                self.registry.write(&registry)?;
                info!(entry = what, "added to configuration");
                true
            }
            Insertion::AlreadyPresent => {
                debug!(entry = what, "already configured");
                false
            }
            Insertion::Conflict(message) => return Err(CasError::conflict(message)),
        };

        let applied = is_live().and_then(|active| {
            if active {
                debug!(entry = what, "already active");
                Ok(false)
            } else {
                apply().map(|()| true)
            }
        });

        match applied {
            Ok(true) => {
                info!(entry = what, "applied");
                Ok(Outcome::CHANGED)
            }
            Ok(false) => Ok(Outcome { changed: persisted }),
            Err(e) => Err(self.rollback(what, &snapshot, persisted, e)),
        }
    }

    fn rollback(
        &self,
        what: &str,
        snapshot: &RegistrySnapshot,
        persisted: bool,
        cause: ControlPlaneError,
    ) -> CasError {
        let cause = CasError::from(cause);
        if !persisted {
            return cause;
        }

        warn!(entry = what, error = %cause, "apply failed, restoring configuration");
        match self.registry.restore(snapshot) {
            Ok(()) => cause,
            Err(e) => CasError::RollbackFailed {
                cause: Box::new(cause),
                rollback: e.to_string(),
            },
        }
    }
}

#[cfg(unix)]
fn check_block_device(device: &Path) -> CasResult<()> {
    use std::os::unix::fs::FileTypeExt;

    let meta = std::fs::metadata(device).map_err(|e| {
        CasError::validation(format!("Device {} not found: {}", device.display(), e))
    })?;
    if !meta.file_type().is_block_device() {
        return Err(CasError::validation(format!(
            "{} is not a block device",
            device.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_block_device(device: &Path) -> CasResult<()> {
    if !device.exists() {
        return Err(CasError::validation(format!(
            "Device {} not found",
            device.display()
        )));
    }
    Ok(())
}
