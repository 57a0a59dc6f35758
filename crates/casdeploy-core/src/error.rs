//! Error types for the reconciliation engine.

use std::path::PathBuf;

use crate::control::ControlPlaneError;
use crate::ioclass::PolicyFormatError;

/// Engine errors.
///
/// An insertion that finds the desired entry in place is not an error; see
/// [`crate::registry::Insertion::AlreadyPresent`].
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// Malformed or out-of-range request input.
    #[error("{message}")]
    Validation { message: String },

    /// I/O-class policy file rejected.
    #[error(transparent)]
    PolicyFormat(#[from] PolicyFormatError),

    /// Desired state collides with a differently configured entry.
    #[error("{message}")]
    Conflict { message: String },

    /// Registry file missing, unreadable or corrupt.
    #[error("configuration registry unavailable ({}): {message}", path.display())]
    RegistryUnavailable { path: PathBuf, message: String },

    /// Persisting the registry failed.
    #[error("couldn't write config file ({}): {message}", path.display())]
    RegistryWrite { path: PathBuf, message: String },

    /// Live action failed; the diagnostic of the tool is carried verbatim.
    #[error("Internal casadm error({0})")]
    ControlPlane(#[from] ControlPlaneError),

    /// Live action failed and restoring the previous registry failed too.
    #[error("{cause}; additionally restoring the previous configuration failed: {rollback}")]
    RollbackFailed { cause: Box<CasError>, rollback: String },

    /// Stop was issued but devices are still listed afterwards.
    #[error("Couldn't stop all cache devices ({remaining} still running)")]
    NotAllStopped { remaining: usize },
}

impl CasError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Stable name of the error class, used as the prefix of task failure messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::PolicyFormat(_) => "PolicyFormatError",
            Self::Conflict { .. } => "ConflictingConfig",
            Self::RegistryUnavailable { .. } => "RegistryUnavailable",
            Self::RegistryWrite { .. } => "RegistryWriteError",
            Self::ControlPlane(_) => "ControlPlaneError",
            Self::RollbackFailed { .. } => "RollbackFailed",
            Self::NotAllStopped { .. } => "ControlPlaneError",
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Caller input
            Self::Validation { .. } => 1,
            Self::PolicyFormat(_) => 1,

            // Declared state collision
            Self::Conflict { .. } => 3,

            // Durable store
            Self::RegistryUnavailable { .. } => 4,
            Self::RegistryWrite { .. } => 4,

            // Live subsystem
            Self::ControlPlane(_) => 5,
            Self::RollbackFailed { .. } => 5,
            Self::NotAllStopped { .. } => 5,
        }
    }
}

/// Result type for engine operations.
pub type CasResult<T> = Result<T, CasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_plane_message_carries_diagnostic() {
        let err = CasError::from(ControlPlaneError::Command {
            command: "casadm --start-cache".to_string(),
            status: Some(1),
            stderr: "Device already in use".to_string(),
        });
        assert_eq!(err.to_string(), "Internal casadm error(Device already in use)");
        assert_eq!(err.kind(), "ControlPlaneError");
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_rollback_failure_reports_both() {
        let err = CasError::RollbackFailed {
            cause: Box::new(CasError::from(ControlPlaneError::Command {
                command: "casadm --add-core".to_string(),
                status: Some(22),
                stderr: "No such cache".to_string(),
            })),
            rollback: "disk full".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("No such cache"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_exit_code_classes() {
        assert_eq!(CasError::validation("bad").exit_code(), 1);
        assert_eq!(CasError::conflict("taken").exit_code(), 3);
        assert_eq!(CasError::NotAllStopped { remaining: 2 }.exit_code(), 5);
    }
}
