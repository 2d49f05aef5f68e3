//! rados-deploy library
//!
//! Core functionality for deploying RADOS-Ceph clusters over SSH: node
//! directory handling, role classification, the SSH session pool, remote
//! command fan-out, and the lifecycle phase orchestrators.

pub mod backend;
pub mod cli;
pub mod cluster_config;
pub mod daemons;
pub mod data;
pub mod defaults;
pub mod designation;
pub mod error;
pub mod fanout;
pub mod phases;
pub mod placement;
pub mod report;
pub mod reservation;
pub mod runner;
pub mod session;

// Re-export main types for convenience
pub use backend::StorageBackend;
pub use designation::{Designation, Topology};
pub use error::{DeployError, Result};
pub use phases::install::{install, InstallOptions};
pub use phases::restart::restart;
pub use phases::start::{start, StartOptions};
pub use phases::stop::{stop, StopOptions};
pub use phases::uninstall::{uninstall, UninstallOptions};
pub use phases::CommonOptions;
pub use placement::placement_groups;
pub use reservation::{Node, NodeId, NodeRecord, Reservation};
pub use runner::{RemoteAction, StepResult};
pub use session::{RemoteSession, SessionPool, SshCredentials};
