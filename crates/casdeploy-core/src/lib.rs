//! Configuration reconciliation engine for Open CAS block-device caching.
//!
//! Desired cache and core devices are recorded in the registry file and then
//! brought up through a [`control::ControlPlane`]. A failed live action after a
//! registry write restores the previous registry bytes.

pub mod config;
pub mod control;
pub mod descriptor;
pub mod error;
pub mod facts;
pub mod ioclass;
pub mod reconcile;
pub mod registry;
pub mod task;
pub mod types;

pub use config::EngineConfig;
pub use control::{Casadm, ControlPlane, ControlPlaneError, InMemoryControlPlane};
pub use descriptor::{CacheDescriptor, CoreDescriptor, Scalar};
pub use error::{CasError, CasResult};
pub use facts::Facts;
pub use ioclass::{IoClassPolicy, PolicyFormatError};
pub use reconcile::{Outcome, Reconciler};
pub use registry::{Insertion, Registry, RegistryFile};
pub use task::{parse_manifest, StopArgs, Task, TaskReport};
pub use types::{CacheConfig, CacheMode, CleaningPolicy, CoreConfig, LineSize, PromotionPolicy};
