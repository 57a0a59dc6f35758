//! Read-only introspection of the installed subsystem.

use serde::Serialize;
use tracing::warn;

use crate::control::{ControlPlane, VersionInfo};
use crate::reconcile::Reconciler;

/// What is known about the local caching subsystem.
///
/// Serialized with the fact names used by deployment tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facts {
    #[serde(rename = "opencas_installed")]
    pub installed: bool,

    #[serde(rename = "opencas_installed_version", skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<VersionInfo>,

    #[serde(rename = "opencas_config_nonempty", skip_serializing_if = "Option::is_none")]
    pub config_nonempty: Option<bool>,

    #[serde(rename = "opencas_devices_started", skip_serializing_if = "Option::is_none")]
    pub devices_started: Option<bool>,
}

impl<C: ControlPlane> Reconciler<C> {
    /// Never fails; anything that cannot be determined degrades the facts.
    pub fn gather_facts(&self) -> Facts {
        let version = match self.control().query_version() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "caching subsystem not installed");
                return Facts::default();
            }
        };

        let config_nonempty = match self.registry_file().load() {
            Ok(snapshot) => !snapshot.registry().is_empty(),
            Err(e) => {
                warn!(error = %e, "registry unreadable");
                false
            }
        };

        let devices_started = match self.control().list_active_caches() {
            Ok(caches) => !caches.is_empty(),
            Err(e) => {
                warn!(error = %e, "couldn't list caches");
                return Facts::default();
            }
        };

        Facts {
            installed: true,
            installed_version: Some(version),
            config_nonempty: Some(config_nonempty),
            devices_started: Some(devices_started),
        }
    }
}
