//! Modules compiled into the host binary.
//!
//! Each one registers itself in [`modhost_runtime::MODULES`] so descriptors can
//! refer to it by name.

pub mod heartbeat;
pub mod uptime;
