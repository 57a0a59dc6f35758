//! Control-plane abstraction over the live caching subsystem.
//!
//! The engine never talks to the kernel directly; everything it knows about
//! live state and every action it takes goes through [`ControlPlane`].

mod casadm;
mod memory;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::types::{CacheConfig, CoreConfig};

pub use casadm::{Casadm, DEFAULT_CASADM};
pub use memory::{InMemoryControlPlane, RecordedCall};

/// Component name → version string, as reported by the control utility.
pub type VersionInfo = BTreeMap<String, String>;

/// Failure of a control-plane action. The diagnostic is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    /// The control utility could not be executed.
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    /// The control utility ran and reported failure.
    #[error("{stderr}")]
    Command {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The control utility produced output that could not be understood.
    #[error("unexpected output from {command}: {message}")]
    Output { command: String, message: String },
}

/// A core attached to a live cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveCore {
    pub core_id: u16,
    pub device: PathBuf,
    pub status: String,
}

/// A running cache and its attached cores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveCache {
    pub cache_id: u16,
    pub device: PathBuf,
    pub status: String,
    pub mode: Option<String>,
    pub cores: Vec<LiveCore>,
}

/// Capabilities the engine needs from the caching subsystem.
///
/// All calls are synchronous and bounded; implementations do not retry.
pub trait ControlPlane {
    fn query_version(&self) -> Result<VersionInfo, ControlPlaneError>;

    fn list_active_caches(&self) -> Result<Vec<LiveCache>, ControlPlaneError>;

    /// Start a cache. With `load` the cache metadata present on the device is reused.
    fn start_cache(
        &self,
        cache: &CacheConfig,
        load: bool,
        force: bool,
    ) -> Result<(), ControlPlaneError>;

    /// Apply cleaning/promotion/io-class settings to a started cache.
    fn configure_cache(&self, cache: &CacheConfig) -> Result<(), ControlPlaneError>;

    fn attach_core(&self, core: &CoreConfig, try_attach_only: bool)
        -> Result<(), ControlPlaneError>;

    fn stop_all(&self, flush: bool) -> Result<(), ControlPlaneError>;

    fn is_cache_active(&self, cache: &CacheConfig) -> Result<bool, ControlPlaneError> {
        Ok(self
            .list_active_caches()?
            .iter()
            .any(|c| c.cache_id == cache.cache_id))
    }

    fn is_core_attached(&self, core: &CoreConfig) -> Result<bool, ControlPlaneError> {
        Ok(self
            .list_active_caches()?
            .iter()
            .filter(|c| c.cache_id == core.cache_id)
            .any(|c| c.cores.iter().any(|k| k.core_id == core.core_id)))
    }

    /// Number of live devices, caches and cores together.
    fn live_device_count(&self) -> Result<usize, ControlPlaneError> {
        Ok(self
            .list_active_caches()?
            .iter()
            .map(|c| 1 + c.cores.len())
            .sum())
    }
}
