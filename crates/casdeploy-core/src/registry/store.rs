//! Registry file IO.
//!
//! Writes go to a temporary file in the destination directory which is
//! renamed over the registry once fully written, so a concurrent or later
//! `load` never observes a partial file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::format::parse_registry;
use super::Registry;
use crate::error::{CasError, CasResult};

/// Location of the registry managed by the caching subsystem.
pub const DEFAULT_REGISTRY_PATH: &str = "/etc/opencas/opencas.conf";

#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

/// Registry as loaded, together with the exact bytes it was parsed from.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    registry: Registry,
    raw: String,
}

impl RegistrySnapshot {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// File content at load time.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Handle to the registry file. Holds no open file between operations.
#[derive(Debug, Clone)]
pub struct RegistryFile {
    path: PathBuf,
}

impl RegistryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> CasResult<RegistrySnapshot> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| self.unavailable(e.to_string()))?;
        let registry = parse_registry(&raw).map_err(|e| self.unavailable(e))?;

        debug!(
            path = %self.path.display(),
            caches = registry.caches.len(),
            cores = registry.cores.len(),
            "loaded registry"
        );
        Ok(RegistrySnapshot { registry, raw })
    }

    /// Overwrite the file with the full serialized registry.
    pub fn write(&self, registry: &Registry) -> CasResult<()> {
        self.write_atomic(&registry.to_text())?;
        info!(
            path = %self.path.display(),
            caches = registry.caches.len(),
            cores = registry.cores.len(),
            "saved registry"
        );
        Ok(())
    }

    /// Put back the exact bytes captured by `load`.
    pub fn restore(&self, snapshot: &RegistrySnapshot) -> CasResult<()> {
        self.write_atomic(&snapshot.raw)?;
        info!(path = %self.path.display(), "restored previous registry");
        Ok(())
    }

    fn write_atomic(&self, content: &str) -> CasResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| self.write_failed(format!("failed to create temp file: {}", e)))?;
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.write_failed(format!("failed to write temp file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&self.path)
                .map(|m| m.permissions().mode())
                .unwrap_or(NEW_FILE_MODE);
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(mode))
                .map_err(|e| self.write_failed(format!("failed to set permissions: {}", e)))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| self.write_failed(format!("failed to rename temp file: {}", e.error)))?;
        Ok(())
    }

    fn unavailable(&self, message: String) -> CasError {
        CasError::RegistryUnavailable {
            path: self.path.clone(),
            message,
        }
    }

    fn write_failed(&self, message: String) -> CasError {
        CasError::RegistryWrite {
            path: self.path.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CacheConfig, CacheMode, CoreConfig};

    const ORIGINAL: &str = "version=V1\n# hand written\n[caches]\n1 /dev/nvme0n1 wb\n[cores]\n";

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = RegistryFile::new(dir.path().join("opencas.conf"));
        let err = file.load().unwrap_err();
        assert!(matches!(err, CasError::RegistryUnavailable { .. }));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opencas.conf");
        std::fs::write(&path, "[caches]\nnot a cache line at all here\n").unwrap();
        let err = RegistryFile::new(&path).load().unwrap_err();
        assert!(matches!(err, CasError::RegistryUnavailable { .. }));
    }

    #[test]
    fn test_write_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = RegistryFile::new(dir.path().join("opencas.conf"));

        let mut registry = Registry::new("V1");
        registry.insert_cache(CacheConfig::new(1, "/dev/nvme0n1", CacheMode::Wb));
        registry.insert_core(CoreConfig::new(1, 1, "/dev/sda"));
        file.write(&registry).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded.registry(), &registry);
        assert_eq!(loaded.raw(), registry.to_text());
    }

    #[test]
    fn test_restore_puts_back_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opencas.conf");
        std::fs::write(&path, ORIGINAL).unwrap();
        let file = RegistryFile::new(&path);

        let snapshot = file.load().unwrap();
        let mut registry = snapshot.registry().clone();
        registry.insert_core(CoreConfig::new(1, 1, "/dev/sda"));
        file.write(&registry).unwrap();
        assert_ne!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);

        file.restore(&snapshot).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = RegistryFile::new(dir.path().join("opencas.conf"));
        file.write(&Registry::new("V1")).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opencas.conf");
        std::fs::write(&path, ORIGINAL).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        RegistryFile::new(&path).write(&Registry::new("V1")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
