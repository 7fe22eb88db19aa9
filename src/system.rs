//! Portable host queries.

use crate::connection::Identity;
use sysinfo::System;

/// Current user and computer name.
pub fn current_identity() -> Identity {
    let user = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown".to_string());
    let computer = System::host_name().unwrap_or_else(|| "unknown".to_string());
    Identity { user, computer }
}
