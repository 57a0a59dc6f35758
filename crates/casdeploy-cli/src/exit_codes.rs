//! Exit codes for casdeploy.
//! These codes are part of the public contract; scripts branch on them.

use casdeploy_core::CasError;

pub const EXIT_SUCCESS: i32 = 0;
pub const VALIDATION_FAILED: i32 = 1; // Bad request or io class policy
pub const CONFIG_ERROR: i32 = 2; // Arguments, engine config, manifest file
pub const CONFLICT: i32 = 3; // Declared state collides with the registry
pub const REGISTRY_ERROR: i32 = 4; // Registry unreadable or not writable
pub const CONTROL_PLANE_ERROR: i32 = 5; // casadm failed, rollback failed, devices left running

pub fn for_error(err: &CasError) -> i32 {
    err.exit_code()
}
