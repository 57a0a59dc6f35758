//! Engine configuration.
//!
//! ```yaml
//! registry_path: /etc/opencas/opencas.conf
//! ioclass_dir: /etc/opencas/ansible
//! casadm_path: /sbin/casadm
//! strict_devices: true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::DEFAULT_CASADM;
use crate::error::{CasError, CasResult};
use crate::registry::DEFAULT_REGISTRY_PATH;

/// Directory holding I/O-class policies referenced by name.
pub const DEFAULT_IOCLASS_DIR: &str = "/etc/opencas/ansible";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Registry file shared with the caching subsystem.
    pub registry_path: PathBuf,

    /// Where `io_class` names are resolved.
    pub ioclass_dir: PathBuf,

    /// Control utility binary.
    pub casadm_path: PathBuf,

    /// Require configured devices to exist as block devices.
    pub strict_devices: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            ioclass_dir: PathBuf::from(DEFAULT_IOCLASS_DIR),
            casadm_path: PathBuf::from(DEFAULT_CASADM),
            strict_devices: true,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> CasResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CasError::validation(format!("failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content).map_err(|e| {
            CasError::validation(format!("failed to parse config {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}
