//! Declarative tasks and their reports.
//!
//! A task is a mapping with exactly one action key:
//!
//! ```yaml
//! - gather_facts: true
//! - configure_cache_device:
//!     cache_device: /dev/nvme0n1
//!     id: 1
//!     cache_mode: wb
//! - configure_core_device:
//!     cached_volume: /dev/sda
//!     cache_id: 1
//!     id: 1
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::control::ControlPlane;
use crate::descriptor::{CacheDescriptor, CoreDescriptor};
use crate::error::{CasError, CasResult};
use crate::facts::Facts;
use crate::reconcile::{Outcome, Reconciler};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopArgs {
    #[serde(default)]
    pub flush: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    GatherFacts,
    Zap,
    Stop(StopArgs),
    CheckCacheConfig(CacheDescriptor),
    ConfigureCacheDevice(CacheDescriptor),
    CheckCoreConfig(CoreDescriptor),
    ConfigureCoreDevice(CoreDescriptor),
    /// `gather_facts: false` / `zap: false`: nothing to do.
    Skip,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::GatherFacts => "gather_facts",
            Task::Zap => "zap",
            Task::Stop(_) => "stop",
            Task::CheckCacheConfig(_) => "check_cache_config",
            Task::ConfigureCacheDevice(_) => "configure_cache_device",
            Task::CheckCoreConfig(_) => "check_core_config",
            Task::ConfigureCoreDevice(_) => "configure_core_device",
            Task::Skip => "skip",
        }
    }
}

/// Wire shape of a task.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskSpec {
    gather_facts: Option<bool>,
    #[serde(alias = "reset")]
    zap: Option<bool>,
    stop: Option<StopArgs>,
    check_cache_config: Option<CacheDescriptor>,
    configure_cache_device: Option<CacheDescriptor>,
    check_core_config: Option<CoreDescriptor>,
    configure_core_device: Option<CoreDescriptor>,
}

impl TryFrom<TaskSpec> for Task {
    type Error = CasError;

    fn try_from(spec: TaskSpec) -> CasResult<Self> {
        let mut actions = Vec::new();
        if let Some(on) = spec.gather_facts {
            actions.push(if on { Task::GatherFacts } else { Task::Skip });
        }
        if let Some(on) = spec.zap {
            actions.push(if on { Task::Zap } else { Task::Skip });
        }
        if let Some(args) = spec.stop {
            actions.push(Task::Stop(args));
        }
        if let Some(d) = spec.check_cache_config {
            actions.push(Task::CheckCacheConfig(d));
        }
        if let Some(d) = spec.configure_cache_device {
            actions.push(Task::ConfigureCacheDevice(d));
        }
        if let Some(d) = spec.check_core_config {
            actions.push(Task::CheckCoreConfig(d));
        }
        if let Some(d) = spec.configure_core_device {
            actions.push(Task::ConfigureCoreDevice(d));
        }

        match actions.len() {
            0 => Err(CasError::validation("task names no action")),
            1 => Ok(actions.remove(0)),
            n => Err(CasError::validation(format!(
                "task names {} actions, expected exactly one",
                n
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Task {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spec = TaskSpec::deserialize(deserializer)?;
        Task::try_from(spec).map_err(serde::de::Error::custom)
    }
}

/// Parse a YAML manifest: a list of tasks, or a single task mapping.
pub fn parse_manifest(content: &str) -> CasResult<Vec<Task>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Manifest {
        Many(Vec<Task>),
        One(Task),
    }

    // Untagged errors are opaque, so retry as a list to surface the real cause.
    match serde_yaml::from_str::<Manifest>(content) {
        Ok(Manifest::Many(tasks)) => Ok(tasks),
        Ok(Manifest::One(task)) => Ok(vec![task]),
        Err(_) => match serde_yaml::from_str::<Vec<Task>>(content) {
            Ok(tasks) => Ok(tasks),
            Err(list_err) => serde_yaml::from_str::<Task>(content)
                .map(|task| vec![task])
                .map_err(|_| CasError::validation(format!("invalid task manifest: {}", list_err))),
        },
    }
}

/// Structured result of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub changed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<Facts>,
}

impl TaskReport {
    pub fn from_outcome(outcome: Outcome) -> Self {
        Self {
            changed: outcome.changed,
            ..Self::default()
        }
    }

    /// Failure report; the message is prefixed with the error class.
    pub fn from_error(err: &CasError) -> Self {
        Self {
            failed: true,
            msg: Some(format!("{}: {}", err.kind(), err)),
            ..Self::default()
        }
    }
}

impl<C: ControlPlane> Reconciler<C> {
    /// Run one task, keeping the error for callers that need its class.
    pub fn try_run_task(&self, task: &Task) -> CasResult<TaskReport> {
        debug!(task = task.name(), "running task");
        let outcome = match task {
            Task::GatherFacts => {
                return Ok(TaskReport {
                    facts: Some(self.gather_facts()),
                    ..TaskReport::default()
                })
            }
            Task::Skip => Outcome::UNCHANGED,
            Task::Zap => self.reset_configuration()?,
            Task::Stop(args) => self.stop_devices(args.flush)?,
            Task::CheckCacheConfig(d) => {
                self.check_cache_config(d)?;
                Outcome::UNCHANGED
            }
            Task::ConfigureCacheDevice(d) => self.configure_cache_device(d)?,
            Task::CheckCoreConfig(d) => {
                self.check_core_config(d)?;
                Outcome::UNCHANGED
            }
            Task::ConfigureCoreDevice(d) => self.configure_core_device(d)?,
        };
        Ok(TaskReport::from_outcome(outcome))
    }

    pub fn run_task(&self, task: &Task) -> TaskReport {
        self.try_run_task(task).unwrap_or_else(|e| {
            error!(task = task.name(), error = %e, "task failed");
            TaskReport::from_error(&e)
        })
    }

    /// Run tasks in order, stopping after the first failure.
    pub fn run_manifest(&self, tasks: &[Task]) -> Vec<TaskReport> {
        let mut reports = Vec::with_capacity(tasks.len());
        for task in tasks {
            let report = self.run_task(task);
            let failed = report.failed;
            reports.push(report);
            if failed {
                break;
            }
        }
        reports
    }
}
