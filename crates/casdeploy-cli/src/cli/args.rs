use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "casdeploy",
    version,
    about = "Declarative deployment of Open CAS cache and core devices"
)]
pub struct Cli {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub cmd: Command,
}

/// Overrides for the engine configuration. Unset flags fall back to the
/// config file, then to built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Engine config file (YAML)
    #[arg(long, global = true, env = "CASDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Registry file shared with the caching subsystem
    #[arg(long, global = true, env = "CASDEPLOY_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Directory holding io class policies
    #[arg(long, global = true, env = "CASDEPLOY_IOCLASS_DIR")]
    pub ioclass_dir: Option<PathBuf>,

    /// casadm binary
    #[arg(long, global = true, env = "CASDEPLOY_CASADM")]
    pub casadm: Option<PathBuf>,

    /// Require devices to exist as block devices
    #[arg(long, global = true, env = "CASDEPLOY_STRICT_DEVICES")]
    pub strict_devices: Option<bool>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Report whether the subsystem is installed, configured and running
    Facts,
    /// Empty the configuration registry
    #[command(alias = "zap")]
    Reset,
    /// Stop all running caches and their cores
    Stop(StopArgs),
    /// Cache device configuration
    Cache(CacheArgs),
    /// Core device configuration
    Core(CoreArgs),
    /// I/O classification policies
    Ioclass(IoclassArgs),
    /// Run a YAML task manifest
    Apply(ApplyArgs),
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct StopArgs {
    /// Flush dirty data before stopping
    #[arg(long)]
    pub flush: bool,
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub cmd: CacheCmd,
}

#[derive(Subcommand, Debug)]
pub enum CacheCmd {
    /// Validate a cache request without changing anything
    Check(CacheSpecArgs),
    /// Record the cache and start it if it is not running
    Configure(CacheSpecArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CacheSpecArgs {
    /// Cache device path
    #[arg(long)]
    pub device: PathBuf,

    /// Cache id
    #[arg(long)]
    pub id: i64,

    /// Cache mode (wt, wb, wa, pt, wo)
    #[arg(long)]
    pub mode: String,

    #[arg(long)]
    pub cleaning_policy: Option<String>,

    #[arg(long)]
    pub promotion_policy: Option<String>,

    /// Cache line size in KiB
    #[arg(long)]
    pub line_size: Option<u8>,

    /// Policy file name inside the io class directory
    #[arg(long)]
    pub io_class: Option<String>,

    /// Overwrite existing cache metadata on the device
    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub lazy_startup: bool,
}

#[derive(Args, Debug)]
pub struct CoreArgs {
    #[command(subcommand)]
    pub cmd: CoreCmd,
}

#[derive(Subcommand, Debug)]
pub enum CoreCmd {
    /// Validate a core request without changing anything
    Check(CoreSpecArgs),
    /// Record the core and attach it if it is not attached
    Configure(CoreSpecArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CoreSpecArgs {
    /// Id of the owning cache
    #[arg(long)]
    pub cache_id: i64,

    /// Core id
    #[arg(long)]
    pub id: i64,

    /// Backing device path
    #[arg(long)]
    pub device: PathBuf,

    #[arg(long)]
    pub lazy_startup: bool,
}

#[derive(Args, Debug)]
pub struct IoclassArgs {
    #[command(subcommand)]
    pub cmd: IoclassCmd,
}

#[derive(Subcommand, Debug)]
pub enum IoclassCmd {
    /// Validate an io class policy file
    Validate {
        /// Policy file (CSV)
        file: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Task manifest (YAML)
    #[arg(long, short = 'f')]
    pub file: PathBuf,
}
