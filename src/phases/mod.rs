//! Lifecycle phase orchestrators.
//!
//! Each phase is a strictly ordered sequence of named steps. A step fans
//! out to a subset of nodes, runs concurrently within the step, waits for
//! every result, and then either proceeds, records failures (best-effort
//! cleanup steps), or aborts the run. Step N+1 never starts before step
//! N's barrier resolved.

pub mod install;
pub mod restart;
pub mod start;
pub mod stop;
pub mod uninstall;

use std::path::PathBuf;

use crate::reservation::NodeId;
use crate::session::SshCredentials;

/// Flags shared by every phase invocation.
#[derive(Debug, Clone, Default)]
pub struct CommonOptions {
    /// SSH identity used to reach the nodes; agent auth when absent.
    pub key_path: Option<PathBuf>,
    /// Explicit admin node; deterministic pick when absent.
    pub admin_id: Option<NodeId>,
    /// Only print errors and critical info.
    pub silent: bool,
}

impl CommonOptions {
    pub fn credentials(&self) -> SshCredentials {
        SshCredentials {
            key_path: self.key_path.clone(),
        }
    }
}
