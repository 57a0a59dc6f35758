//! Desired-state requests as callers write them.
//!
//! Descriptors are loosely typed (ids may be numbers or strings, enums are
//! plain strings) and are resolved into [`CacheConfig`] / [`CoreConfig`] at
//! the boundary, before anything touches the registry or the live subsystem.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CasError, CasResult};
use crate::ioclass::policy_path;
use crate::types::{CacheConfig, CacheMode, CoreConfig};

/// A number that may have been written as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<u16> for Scalar {
    fn from(n: u16) -> Self {
        Scalar::Int(i64::from(n))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheDescriptor {
    pub cache_device: Option<PathBuf>,
    pub id: Option<Scalar>,
    pub cache_mode: Option<String>,
    pub cleaning_policy: Option<String>,
    pub promotion_policy: Option<String>,
    pub line_size: Option<Scalar>,
    /// Name of a policy file inside the I/O-class directory.
    pub io_class: Option<String>,
    pub force: Option<bool>,
    pub lazy_startup: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreDescriptor {
    pub id: Option<Scalar>,
    pub cache_id: Option<Scalar>,
    pub cached_volume: Option<PathBuf>,
    pub lazy_startup: Option<bool>,
}

/// A cache request after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub config: CacheConfig,
    pub force: bool,
}

impl CacheDescriptor {
    pub fn resolve(&self, ioclass_dir: &Path) -> CasResult<CacheRequest> {
        let missing = |what: &str| {
            CasError::validation(format!("Missing cache config parameters ({})", what))
        };

        let device = self
            .cache_device
            .clone()
            .ok_or_else(|| missing("cache_device"))?;
        let id = self.id.as_ref().ok_or_else(|| missing("id"))?;
        let mode = self.cache_mode.as_deref().ok_or_else(|| missing("cache_mode"))?;

        let cache_id = parse_id(id, "cache id", missing)?;
        let mut config = CacheConfig::new(cache_id, device, mode.parse::<CacheMode>()?);

        if let Some(policy) = &self.cleaning_policy {
            config.cleaning_policy = policy.parse()?;
        }
        if let Some(policy) = &self.promotion_policy {
            config.promotion_policy = policy.parse()?;
        }
        if let Some(size) = &self.line_size {
            config.line_size = size.to_string().parse()?;
        }
        if let Some(name) = &self.io_class {
            if name.trim().is_empty() {
                return Err(CasError::validation("io_class name is empty"));
            }
            config.ioclass_file = Some(policy_path(ioclass_dir, name));
        }
        config.lazy_startup = self.lazy_startup.unwrap_or(false);

        Ok(CacheRequest {
            config,
            force: self.force.unwrap_or(false),
        })
    }
}

impl CoreDescriptor {
    pub fn resolve(&self) -> CasResult<CoreConfig> {
        let missing = |what: &str| {
            CasError::validation(format!("Missing core config parameters ({})", what))
        };

        let device = self
            .cached_volume
            .clone()
            .ok_or_else(|| missing("cached_volume"))?;
        let cache_id = self.cache_id.as_ref().ok_or_else(|| missing("cache_id"))?;
        let core_id = self.id.as_ref().ok_or_else(|| missing("id"))?;

        let cache_id = parse_id(cache_id, "cache id", missing)?;
        let core_id = parse_id(core_id, "core id", missing)?;

        let mut core = CoreConfig::new(cache_id, core_id, device);
        core.lazy_startup = self.lazy_startup.unwrap_or(false);
        Ok(core)
    }
}

/// Parse an id. Values that are not integers are reported through `missing`;
/// integers that cannot be an id at all are reported as invalid here, the
/// exact id range is left to the config's own validation.
fn parse_id(value: &Scalar, what: &str, missing: impl Fn(&str) -> CasError) -> CasResult<u16> {
    let n = match value {
        Scalar::Int(n) => *n,
        Scalar::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| missing(&format!("{} '{}' is not an integer", what, s)))?,
    };
    u16::try_from(n).map_err(|_| CasError::validation(format!("{} is invalid {}", n, what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CleaningPolicy, LineSize, PromotionPolicy};

    fn cache_desc() -> CacheDescriptor {
        CacheDescriptor {
            cache_device: Some(PathBuf::from("/dev/nvme0n1")),
            id: Some(Scalar::Text("1".to_string())),
            cache_mode: Some("WT".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_cache_minimal() {
        let req = cache_desc().resolve(Path::new("/etc/opencas/ansible")).unwrap();
        assert_eq!(req.config.cache_id, 1);
        assert_eq!(req.config.cache_mode, CacheMode::Wt);
        assert_eq!(req.config.cleaning_policy, CleaningPolicy::Alru);
        assert_eq!(req.config.promotion_policy, PromotionPolicy::Always);
        assert_eq!(req.config.line_size, LineSize::K4);
        assert!(!req.force);
        assert!(req.config.ioclass_file.is_none());
    }

    #[test]
    fn test_resolve_cache_full() {
        let desc = CacheDescriptor {
            id: Some(Scalar::Int(1000)),
            cleaning_policy: Some("acp".to_string()),
            promotion_policy: Some("nhit".to_string()),
            line_size: Some(Scalar::Int(64)),
            io_class: Some("db.csv".to_string()),
            force: Some(true),
            ..cache_desc()
        };
        let req = desc.resolve(Path::new("/etc/opencas/ansible")).unwrap();
        assert_eq!(req.config.cache_id, 1000);
        assert_eq!(req.config.line_size, LineSize::K64);
        assert_eq!(
            req.config.ioclass_file,
            Some(PathBuf::from("/etc/opencas/ansible/db.csv"))
        );
        assert!(req.force);
    }

    #[test]
    fn test_resolve_cache_missing_params() {
        let cases = [
            CacheDescriptor {
                id: Some(Scalar::Int(1)),
                ..Default::default()
            },
            CacheDescriptor {
                cache_device: Some(PathBuf::from("/dev/dummy")),
                cache_mode: Some("WT".to_string()),
                ..Default::default()
            },
            CacheDescriptor {
                io_class: Some("best_config.rar".to_string()),
                promotion_policy: Some("nhit".to_string()),
                ..Default::default()
            },
            CacheDescriptor {
                id: Some(Scalar::Text("one".to_string())),
                ..cache_desc()
            },
        ];
        for desc in cases {
            let err = desc.resolve(Path::new("/tmp")).unwrap_err();
            assert!(err.to_string().starts_with("Missing cache config parameters"), "{}", err);
        }
    }

    #[test]
    fn test_resolve_cache_invalid_enums() {
        let desc = CacheDescriptor {
            cache_mode: Some("write-sometimes".to_string()),
            ..cache_desc()
        };
        assert!(desc.resolve(Path::new("/tmp")).is_err());

        let desc = CacheDescriptor {
            line_size: Some(Scalar::Text("3".to_string())),
            ..cache_desc()
        };
        assert!(desc.resolve(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_resolve_core() {
        let desc = CoreDescriptor {
            id: Some(Scalar::Text("1".to_string())),
            cache_id: Some(Scalar::Int(2)),
            cached_volume: Some(PathBuf::from("/dev/dummy")),
            lazy_startup: None,
        };
        let core = desc.resolve().unwrap();
        assert_eq!((core.cache_id, core.core_id), (2, 1));
        assert_eq!(core.device, PathBuf::from("/dev/dummy"));
    }

    #[test]
    fn test_resolve_core_missing_params() {
        let cases = [
            CoreDescriptor {
                cache_id: Some(Scalar::Int(1)),
                ..Default::default()
            },
            CoreDescriptor {
                id: Some(Scalar::Int(1)),
                cached_volume: Some(PathBuf::from("/dev/dummy")),
                ..Default::default()
            },
            CoreDescriptor {
                id: Some(Scalar::Text("one".to_string())),
                cache_id: Some(Scalar::Int(1)),
                cached_volume: Some(PathBuf::from("/dev/dummy")),
                lazy_startup: None,
            },
        ];
        for desc in cases {
            let err = desc.resolve().unwrap_err();
            assert!(err.to_string().starts_with("Missing core config parameters"), "{}", err);
        }
    }

    #[test]
    fn test_out_of_range_id_keeps_value_in_message() {
        let desc = CacheDescriptor {
            id: Some(Scalar::Int(70000)),
            ..cache_desc()
        };
        let err = desc.resolve(Path::new("/tmp")).unwrap_err();
        assert_eq!(err.to_string(), "70000 is invalid cache id");

        let desc = CoreDescriptor {
            id: Some(Scalar::Text("-1".to_string())),
            cache_id: Some(Scalar::Int(1)),
            cached_volume: Some(PathBuf::from("/dev/dummy")),
            lazy_startup: None,
        };
        let err = desc.resolve().unwrap_err();
        assert!(matches!(err, CasError::Validation { .. }));
        assert_eq!(err.to_string(), "-1 is invalid core id");
    }

    #[test]
    fn test_id_just_past_range_fails_validation() {
        let desc = CacheDescriptor {
            id: Some(Scalar::Int(16385)),
            ..cache_desc()
        };
        let req = desc.resolve(Path::new("/tmp")).unwrap();
        let err = req.config.validate().unwrap_err();
        assert_eq!(err.to_string(), "16385 is invalid cache id");
    }

    #[test]
    fn test_descriptor_from_yaml() {
        let yaml = "cache_device: /dev/nvme0n1\nid: 2\ncache_mode: wb\nline_size: \"8\"\n";
        let desc: CacheDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(desc.id, Some(Scalar::Int(2)));
        let req = desc.resolve(Path::new("/tmp")).unwrap();
        assert_eq!(req.config.line_size, LineSize::K8);

        let unknown = "cache_device: /dev/nvme0n1\npath: /dev/sda\n";
        assert!(serde_yaml::from_str::<CacheDescriptor>(unknown).is_err());
    }
}
