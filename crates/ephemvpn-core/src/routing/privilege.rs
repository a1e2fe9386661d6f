use nix::unistd::geteuid;

use crate::error::CoreError;

/// Fail with `PrivilegeRequired` unless running as root.
pub fn require_root(operation: &str) -> Result<(), CoreError> {
    if geteuid().is_root() {
        Ok(())
    } else {
        Err(CoreError::PrivilegeRequired {
            operation: operation.to_owned(),
        })
    }
}
