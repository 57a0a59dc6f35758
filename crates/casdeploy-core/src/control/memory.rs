//! In-memory control plane for tests and dry simulations.

use std::sync::{Mutex, MutexGuard};

use super::{ControlPlane, ControlPlaneError, LiveCache, LiveCore, VersionInfo};
use crate::types::{CacheConfig, CoreConfig};

/// A call observed by [`InMemoryControlPlane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    StartCache { cache_id: u16, load: bool, force: bool },
    ConfigureCache { cache_id: u16 },
    AttachCore { cache_id: u16, core_id: u16, try_attach_only: bool },
    StopAll { flush: bool },
}

#[derive(Debug, Default)]
struct State {
    version: Option<VersionInfo>,
    caches: Vec<LiveCache>,
    calls: Vec<RecordedCall>,
    fail_list: Option<String>,
    fail_start: Option<String>,
    fail_configure: Option<String>,
    fail_attach: Option<String>,
    fail_stop: Option<String>,
    stop_is_noop: bool,
}

/// Simulated caching subsystem. Failures can be injected per action.
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    state: Mutex<State>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subsystem that reports the given component versions.
    pub fn installed(version: &str) -> Self {
        let plane = Self::new();
        {
            let mut state = plane.lock();
            let mut info = VersionInfo::new();
            info.insert("CAS Cache Kernel Module".to_string(), version.to_string());
            info.insert("CAS CLI Utility".to_string(), version.to_string());
            state.version = Some(info);
        }
        plane
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn with_cache(self, cache: &CacheConfig) -> Self {
        self.lock().caches.push(live_cache(cache));
        self
    }

    pub fn with_core(self, core: &CoreConfig) -> Self {
        self.push_core(core);
        self
    }

    pub fn fail_list(self, diagnostic: &str) -> Self {
        self.lock().fail_list = Some(diagnostic.to_string());
        self
    }

    pub fn fail_start(self, diagnostic: &str) -> Self {
        self.lock().fail_start = Some(diagnostic.to_string());
        self
    }

    pub fn fail_configure(self, diagnostic: &str) -> Self {
        self.lock().fail_configure = Some(diagnostic.to_string());
        self
    }

    pub fn fail_attach(self, diagnostic: &str) -> Self {
        self.lock().fail_attach = Some(diagnostic.to_string());
        self
    }

    pub fn fail_stop(self, diagnostic: &str) -> Self {
        self.lock().fail_stop = Some(diagnostic.to_string());
        self
    }

    /// Make `stop_all` succeed without stopping anything.
    pub fn stop_leaves_devices(self) -> Self {
        self.lock().stop_is_noop = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn live_caches(&self) -> Vec<LiveCache> {
        self.lock().caches.clone()
    }

    fn push_core(&self, core: &CoreConfig) {
        let mut state = self.lock();
        let live = LiveCore {
            core_id: core.core_id,
            device: core.device.clone(),
            status: "Active".to_string(),
        };
        if let Some(cache) = state.caches.iter_mut().find(|c| c.cache_id == core.cache_id) {
            cache.cores.push(live);
        }
    }
}

fn live_cache(cache: &CacheConfig) -> LiveCache {
    LiveCache {
        cache_id: cache.cache_id,
        device: cache.device.clone(),
        status: "Running".to_string(),
        mode: Some(cache.cache_mode.to_string()),
        cores: Vec::new(),
    }
}

fn failure(command: &str, diagnostic: &Option<String>) -> Result<(), ControlPlaneError> {
    match diagnostic {
        Some(stderr) => Err(ControlPlaneError::Command {
            command: command.to_string(),
            status: Some(1),
            stderr: stderr.clone(),
        }),
        None => Ok(()),
    }
}

impl ControlPlane for InMemoryControlPlane {
    fn query_version(&self) -> Result<VersionInfo, ControlPlaneError> {
        self.lock()
            .version
            .clone()
            .ok_or_else(|| ControlPlaneError::Spawn {
                program: "casadm".to_string(),
                message: "No such file or directory (os error 2)".to_string(),
            })
    }

    fn list_active_caches(&self) -> Result<Vec<LiveCache>, ControlPlaneError> {
        let state = self.lock();
        failure("list-caches", &state.fail_list)?;
        Ok(state.caches.clone())
    }

    fn start_cache(
        &self,
        cache: &CacheConfig,
        load: bool,
        force: bool,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::StartCache {
            cache_id: cache.cache_id,
            load,
            force,
        });
        failure("start-cache", &state.fail_start)?;
        if state.caches.iter().any(|c| c.cache_id == cache.cache_id) {
            return failure(
                "start-cache",
                &Some(format!("Cache ID {} already exists", cache.cache_id)),
            );
        }
        state.caches.push(live_cache(cache));
        Ok(())
    }

    fn configure_cache(&self, cache: &CacheConfig) -> Result<(), ControlPlaneError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::ConfigureCache {
            cache_id: cache.cache_id,
        });
        failure("set-param", &state.fail_configure)
    }

    fn attach_core(
        &self,
        core: &CoreConfig,
        try_attach_only: bool,
    ) -> Result<(), ControlPlaneError> {
        {
            let mut state = self.lock();
            state.calls.push(RecordedCall::AttachCore {
                cache_id: core.cache_id,
                core_id: core.core_id,
                try_attach_only,
            });
            failure("add-core", &state.fail_attach)?;
            if !state.caches.iter().any(|c| c.cache_id == core.cache_id) {
                return failure(
                    "add-core",
                    &Some(format!("Cache {} does not exist", core.cache_id)),
                );
            }
        }
        self.push_core(core);
        Ok(())
    }

    fn stop_all(&self, flush: bool) -> Result<(), ControlPlaneError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::StopAll { flush });
        failure("stop-cache", &state.fail_stop)?;
        if !state.stop_is_noop {
            state.caches.clear();
        }
        Ok(())
    }
}
