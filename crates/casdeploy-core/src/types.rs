//! Cache and core device configuration types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CasError, CasResult};

pub const MIN_CACHE_ID: u16 = 1;
pub const MAX_CACHE_ID: u16 = 16384;
pub const MIN_CORE_ID: u16 = 1;
pub const MAX_CORE_ID: u16 = 4095;

/// Prefix of block devices exported by the caching subsystem itself
/// (`/dev/cas1-1`, ...). The cache id follows directly.
pub const EXPORTED_DEVICE_PREFIX: &str = "/dev/cas";

/// Characters that separate columns, parameters or comments in the registry
/// file and so cannot appear in a recorded path.
const REGISTRY_RESERVED: [char; 3] = ['#', ',', '='];

/// Write policy of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Write-through.
    Wt,
    /// Write-back.
    Wb,
    /// Write-around.
    Wa,
    /// Pass-through.
    Pt,
    /// Write-only.
    Wo,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Wt => "wt",
            CacheMode::Wb => "wb",
            CacheMode::Wa => "wa",
            CacheMode::Pt => "pt",
            CacheMode::Wo => "wo",
        }
    }
}

impl FromStr for CacheMode {
    type Err = CasError;

    fn from_str(s: &str) -> CasResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wt" | "write-through" => Ok(CacheMode::Wt),
            "wb" | "write-back" => Ok(CacheMode::Wb),
            "wa" | "write-around" => Ok(CacheMode::Wa),
            "pt" | "pass-through" => Ok(CacheMode::Pt),
            "wo" | "write-only" => Ok(CacheMode::Wo),
            _ => Err(CasError::validation(format!("{} is invalid cache mode", s))),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy for flushing dirty data to the core device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleaningPolicy {
    #[default]
    Alru,
    Acp,
    Nop,
}

impl CleaningPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleaningPolicy::Alru => "alru",
            CleaningPolicy::Acp => "acp",
            CleaningPolicy::Nop => "nop",
        }
    }
}

impl FromStr for CleaningPolicy {
    type Err = CasError;

    fn from_str(s: &str) -> CasResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alru" => Ok(CleaningPolicy::Alru),
            "acp" => Ok(CleaningPolicy::Acp),
            "nop" => Ok(CleaningPolicy::Nop),
            _ => Err(CasError::validation(format!(
                "{} is invalid cleaning policy name",
                s
            ))),
        }
    }
}

impl fmt::Display for CleaningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy for deciding when data enters the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPolicy {
    #[default]
    Always,
    Nhit,
}

impl PromotionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionPolicy::Always => "always",
            PromotionPolicy::Nhit => "nhit",
        }
    }
}

impl FromStr for PromotionPolicy {
    type Err = CasError;

    fn from_str(s: &str) -> CasResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(PromotionPolicy::Always),
            "nhit" => Ok(PromotionPolicy::Nhit),
            _ => Err(CasError::validation(format!(
                "{} is invalid promotion policy name",
                s
            ))),
        }
    }
}

impl fmt::Display for PromotionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache line size in KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LineSize {
    #[default]
    K4,
    K8,
    K16,
    K32,
    K64,
}

impl LineSize {
    pub fn kib(&self) -> u8 {
        match self {
            LineSize::K4 => 4,
            LineSize::K8 => 8,
            LineSize::K16 => 16,
            LineSize::K32 => 32,
            LineSize::K64 => 64,
        }
    }
}

impl TryFrom<u8> for LineSize {
    type Error = CasError;

    fn try_from(kib: u8) -> CasResult<Self> {
        match kib {
            4 => Ok(LineSize::K4),
            8 => Ok(LineSize::K8),
            16 => Ok(LineSize::K16),
            32 => Ok(LineSize::K32),
            64 => Ok(LineSize::K64),
            _ => Err(CasError::validation(format!(
                "{} is invalid cache line size",
                kib
            ))),
        }
    }
}

impl From<LineSize> for u8 {
    fn from(size: LineSize) -> u8 {
        size.kib()
    }
}

impl FromStr for LineSize {
    type Err = CasError;

    fn from_str(s: &str) -> CasResult<Self> {
        let kib: u8 = s
            .trim()
            .parse()
            .map_err(|_| CasError::validation(format!("{} is invalid cache line size", s)))?;
        LineSize::try_from(kib)
    }
}

impl fmt::Display for LineSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kib())
    }
}

/// A configured cache device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    pub cache_id: u16,
    pub device: PathBuf,
    pub cache_mode: CacheMode,
    pub cleaning_policy: CleaningPolicy,
    pub promotion_policy: PromotionPolicy,
    pub line_size: LineSize,
    pub ioclass_file: Option<PathBuf>,
    pub lazy_startup: bool,
}

impl CacheConfig {
    pub fn new(cache_id: u16, device: impl Into<PathBuf>, cache_mode: CacheMode) -> Self {
        Self {
            cache_id,
            device: device.into(),
            cache_mode,
            cleaning_policy: CleaningPolicy::default(),
            promotion_policy: PromotionPolicy::default(),
            line_size: LineSize::default(),
            ioclass_file: None,
            lazy_startup: false,
        }
    }

    /// Range and recursion checks that need no filesystem access.
    pub fn validate(&self) -> CasResult<()> {
        check_cache_id(self.cache_id)?;
        check_recordable(&self.device, "Cache device")?;
        if let Some(file) = &self.ioclass_file {
            check_recordable(file, "io class file")?;
        }
        check_not_recursive(&self.device)
    }
}

/// A configured core device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreConfig {
    pub cache_id: u16,
    pub core_id: u16,
    pub device: PathBuf,
    pub lazy_startup: bool,
}

impl CoreConfig {
    pub fn new(cache_id: u16, core_id: u16, device: impl Into<PathBuf>) -> Self {
        Self {
            cache_id,
            core_id,
            device: device.into(),
            lazy_startup: false,
        }
    }

    pub fn validate(&self) -> CasResult<()> {
        check_cache_id(self.cache_id)?;
        if !(MIN_CORE_ID..=MAX_CORE_ID).contains(&self.core_id) {
            return Err(CasError::validation(format!(
                "{} is invalid core id",
                self.core_id
            )));
        }
        check_recordable(&self.device, "Core device")?;
        check_not_recursive(&self.device)
    }
}

fn check_cache_id(cache_id: u16) -> CasResult<()> {
    if (MIN_CACHE_ID..=MAX_CACHE_ID).contains(&cache_id) {
        Ok(())
    } else {
        Err(CasError::validation(format!(
            "{} is invalid cache id",
            cache_id
        )))
    }
}

fn check_recordable(path: &Path, what: &str) -> CasResult<()> {
    let text = path.to_string_lossy();
    if text.is_empty() {
        return Err(CasError::validation(format!("{} path is empty", what)));
    }
    if let Some(c) = text
        .chars()
        .find(|c| c.is_whitespace() || REGISTRY_RESERVED.contains(c))
    {
        return Err(CasError::validation(format!(
            "{} path '{}' contains '{}', which the config file cannot hold",
            what,
            text,
            c.escape_default()
        )));
    }
    Ok(())
}

fn check_not_recursive(device: &Path) -> CasResult<()> {
    let exported = device
        .to_string_lossy()
        .strip_prefix(EXPORTED_DEVICE_PREFIX)
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()));
    if exported {
        return Err(CasError::validation(format!(
            "Recursive configuration detected ({})",
            device.display()
        )));
    }
    Ok(())
}
