//! `casadm` process adapter.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::{ControlPlane, ControlPlaneError, LiveCache, LiveCore, VersionInfo};
use crate::types::{CacheConfig, CoreConfig};

/// Binary looked up on `PATH` when no explicit path is configured.
pub const DEFAULT_CASADM: &str = "casadm";

/// Drives the caching subsystem through its command-line utility.
#[derive(Debug, Clone)]
pub struct Casadm {
    binary: PathBuf,
}

impl Default for Casadm {
    fn default() -> Self {
        Self::new(DEFAULT_CASADM)
    }
}

impl Casadm {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, args: &[OsString]) -> Result<String, ControlPlaneError> {
        let command = self.describe(args);
        debug!(command = %command, "running control utility");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| ControlPlaneError::Spawn {
                program: self.binary.display().to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            let stderr = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim_end().to_string()
            } else {
                stderr
            };
            return Err(ControlPlaneError::Command {
                command,
                status: output.status.code(),
                stderr,
            });
        }

        String::from_utf8(output.stdout).map_err(|e| ControlPlaneError::Output {
            command,
            message: e.to_string(),
        })
    }

    fn describe(&self, args: &[OsString]) -> String {
        let mut parts = vec![self.binary.display().to_string()];
        parts.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn stop_cache(&self, cache_id: u16, flush: bool) -> Result<(), ControlPlaneError> {
        let mut args = args(&["--stop-cache", "--cache-id", &cache_id.to_string()]);
        if !flush {
            args.push("--no-data-flush".into());
        }
        self.run(&args)?;
        info!(cache_id, flush, "stopped cache");
        Ok(())
    }
}

fn args(items: &[&str]) -> Vec<OsString> {
    items.iter().map(OsString::from).collect()
}

impl ControlPlane for Casadm {
    fn query_version(&self) -> Result<VersionInfo, ControlPlaneError> {
        let args = args(&["--version", "--output-format", "csv"]);
        let out = self.run(&args)?;
        parse_version(&out).map_err(|message| ControlPlaneError::Output {
            command: self.describe(&args),
            message,
        })
    }

    fn list_active_caches(&self) -> Result<Vec<LiveCache>, ControlPlaneError> {
        let args = args(&["--list-caches", "--output-format", "csv"]);
        let out = self.run(&args)?;
        parse_cache_list(&out).map_err(|message| ControlPlaneError::Output {
            command: self.describe(&args),
            message,
        })
    }

    fn start_cache(
        &self,
        cache: &CacheConfig,
        load: bool,
        force: bool,
    ) -> Result<(), ControlPlaneError> {
        let mut args = args(&["--start-cache", "--cache-device"]);
        args.push(cache.device.clone().into_os_string());

        if load {
            args.push("--load".into());
        } else {
            args.extend([
                OsString::from("--cache-id"),
                cache.cache_id.to_string().into(),
                "--cache-mode".into(),
                cache.cache_mode.as_str().into(),
                "--cache-line-size".into(),
                cache.line_size.to_string().into(),
            ]);
            if force {
                args.push("--force".into());
            }
        }

        self.run(&args)?;
        info!(
            cache_id = cache.cache_id,
            device = %cache.device.display(),
            mode = %cache.cache_mode,
            load,
            force,
            "started cache"
        );
        Ok(())
    }

    fn configure_cache(&self, cache: &CacheConfig) -> Result<(), ControlPlaneError> {
        let id = cache.cache_id.to_string();

        self.run(&args(&[
            "--set-param",
            "--name",
            "cleaning",
            "--cache-id",
            &id,
            "--policy",
            cache.cleaning_policy.as_str(),
        ]))?;
        self.run(&args(&[
            "--set-param",
            "--name",
            "promotion",
            "--cache-id",
            &id,
            "--policy",
            cache.promotion_policy.as_str(),
        ]))?;

        if let Some(file) = &cache.ioclass_file {
            let mut load = args(&["--io-class", "--load-config", "--cache-id", &id, "--file"]);
            load.push(file.clone().into_os_string());
            self.run(&load)?;
        }

        info!(cache_id = cache.cache_id, "configured cache");
        Ok(())
    }

    fn attach_core(
        &self,
        core: &CoreConfig,
        try_attach_only: bool,
    ) -> Result<(), ControlPlaneError> {
        let mut args = args(&[
            "--add-core",
            "--cache-id",
            &core.cache_id.to_string(),
            "--core-id",
            &core.core_id.to_string(),
            "--core-device",
        ]);
        args.push(core.device.clone().into_os_string());
        if try_attach_only {
            args.push("--try-add".into());
        }

        self.run(&args)?;
        info!(
            cache_id = core.cache_id,
            core_id = core.core_id,
            device = %core.device.display(),
            "attached core"
        );
        Ok(())
    }

    fn stop_all(&self, flush: bool) -> Result<(), ControlPlaneError> {
        for cache in self.list_active_caches()? {
            self.stop_cache(cache.cache_id, flush)?;
        }
        Ok(())
    }
}

/// Parse `--version --output-format csv` output (`Name,Version` rows).
pub(crate) fn parse_version(output: &str) -> Result<VersionInfo, String> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    match lines.next() {
        Some(header) if header.trim().eq_ignore_ascii_case("name,version") => {}
        Some(header) => return Err(format!("unexpected header '{}'", header)),
        None => return Err("empty output".to_string()),
    }

    let mut info = VersionInfo::new();
    for line in lines {
        let (name, version) = line
            .rsplit_once(',')
            .ok_or_else(|| format!("malformed row '{}'", line))?;
        info.insert(name.trim().to_string(), version.trim().to_string());
    }
    Ok(info)
}

/// Parse `--list-caches --output-format csv` output.
///
/// Core rows follow the cache they belong to; rows after a `core pool`
/// marker describe detached cores and are skipped. An idle subsystem prints a
/// single notice line (`No caches running`) instead of a table.
pub(crate) fn parse_cache_list(output: &str) -> Result<Vec<LiveCache>, String> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty()).peekable();
    let Some(first) = lines.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = first.split(',').map(str::trim).collect();
    if !header.iter().any(|h| h.eq_ignore_ascii_case("type")) && lines.peek().is_none() {
        debug!(notice = first.trim(), "no caches listed");
        return Ok(Vec::new());
    }
    let col = |name: &str| {
        header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("missing column '{}'", name))
    };
    let (type_col, id_col, disk_col, status_col) =
        (col("type")?, col("id")?, col("disk")?, col("status")?);
    let mode_col = col("write policy").ok();

    let mut caches: Vec<LiveCache> = Vec::new();
    let mut in_pool = false;

    for line in lines {
        let row: Vec<&str> = line.split(',').map(str::trim).collect();
        let get = |i: usize| row.get(i).copied().unwrap_or_default();

        match get(type_col) {
            "cache" => {
                in_pool = false;
                let cache_id = get(id_col)
                    .parse()
                    .map_err(|_| format!("invalid cache id '{}'", get(id_col)))?;
                let mode = mode_col
                    .map(get)
                    .filter(|m| !m.is_empty() && *m != "-")
                    .map(str::to_string);
                caches.push(LiveCache {
                    cache_id,
                    device: PathBuf::from(get(disk_col)),
                    status: get(status_col).to_string(),
                    mode,
                    cores: Vec::new(),
                });
            }
            "core" if !in_pool => {
                let core_id = get(id_col)
                    .parse()
                    .map_err(|_| format!("invalid core id '{}'", get(id_col)))?;
                let cache = caches
                    .last_mut()
                    .ok_or_else(|| format!("core row without cache '{}'", line))?;
                cache.cores.push(LiveCore {
                    core_id,
                    device: PathBuf::from(get(disk_col)),
                    status: get(status_col).to_string(),
                });
            }
            "core pool" => in_pool = true,
            _ => {}
        }
    }

    Ok(caches)
}
