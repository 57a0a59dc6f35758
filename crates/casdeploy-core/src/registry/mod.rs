//! Persisted configuration of caches and cores.
//!
//! The registry is a plain value: it is loaded from its file at the start of
//! every operation, mutated in memory and written back as a whole.

mod format;
mod store;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::types::{CacheConfig, CoreConfig};

pub use format::parse_registry;
pub use store::{RegistryFile, RegistrySnapshot, DEFAULT_REGISTRY_PATH};

/// Result of inserting a desired entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// Entry was added to the registry.
    Inserted,
    /// An identical entry already exists; the registry is unchanged.
    AlreadyPresent,
    /// A different entry occupies the key or the device; the registry is unchanged.
    Conflict(String),
}

/// Declared configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registry {
    /// Opaque format stamp carried across rewrites.
    pub version_tag: String,
    pub caches: BTreeMap<u16, CacheConfig>,
    pub cores: Vec<CoreConfig>,
}

impl Registry {
    pub fn new(version_tag: impl Into<String>) -> Self {
        Self {
            version_tag: version_tag.into(),
            caches: BTreeMap::new(),
            cores: Vec::new(),
        }
    }

    /// Empty registry that keeps the format marker.
    pub fn reset(version_tag: impl Into<String>) -> Self {
        Self::new(version_tag)
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty() && self.cores.is_empty()
    }

    pub fn insert_cache(&mut self, cache: CacheConfig) -> Insertion {
        if let Some(existing) = self.caches.get(&cache.cache_id) {
            return if *existing == cache {
                Insertion::AlreadyPresent
            } else {
                Insertion::Conflict(format!(
                    "Other cache configuration under id {} ({})",
                    cache.cache_id,
                    existing.device.display()
                ))
            };
        }

        if let Some(other) = self
            .caches
            .values()
            .find(|c| same_device(&c.device, &cache.device))
        {
            return Insertion::Conflict(format!(
                "{} is already configured as cache {}",
                cache.device.display(),
                other.cache_id
            ));
        }

        if let Some(core) = self
            .cores
            .iter()
            .find(|c| same_device(&c.device, &cache.device))
        {
            return Insertion::Conflict(format!(
                "{} is already configured as core {}-{}",
                cache.device.display(),
                core.cache_id,
                core.core_id
            ));
        }

        self.caches.insert(cache.cache_id, cache);
        Insertion::Inserted
    }

    /// Insert a core. The referenced cache does not have to be configured yet.
    pub fn insert_core(&mut self, core: CoreConfig) -> Insertion {
        if let Some(cache) = self
            .caches
            .values()
            .find(|c| same_device(&c.device, &core.device))
        {
            return Insertion::Conflict(format!(
                "{} is already configured as cache {}",
                core.device.display(),
                cache.cache_id
            ));
        }

        for existing in &self.cores {
            let same_key = existing.cache_id == core.cache_id && existing.core_id == core.core_id;
            if same_key {
                return if *existing == core {
                    Insertion::AlreadyPresent
                } else {
                    Insertion::Conflict(format!(
                        "Other core device configured under id {}-{} ({})",
                        core.cache_id,
                        core.core_id,
                        existing.device.display()
                    ))
                };
            }
            if same_device(&existing.device, &core.device) {
                return Insertion::Conflict(format!(
                    "{} is already configured as core {}-{}",
                    core.device.display(),
                    existing.cache_id,
                    existing.core_id
                ));
            }
        }

        self.cores.push(core);
        Insertion::Inserted
    }

    pub fn cache(&self, cache_id: u16) -> Option<&CacheConfig> {
        self.caches.get(&cache_id)
    }

    /// Render in the subsystem's config file format.
    pub fn to_text(&self) -> String {
        format::render_registry(self)
    }
}

/// Two paths name the same device when their canonical forms match, or
/// literally when either cannot be resolved.
fn same_device(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
