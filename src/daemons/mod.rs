//! Remote daemon control.
//!
//! Command builders and small step functions for the cluster daemons. The
//! shell strings here are the only place that knows the ceph tooling
//! surface; the orchestration in `phases/` deals purely in steps and
//! aggregates.

pub mod cephfs;
pub mod manager;
pub mod mds;
pub mod monitor;
pub mod osd;
pub mod pool;

use crate::reservation::Node;

/// Path of the deploy tool on the admin node, installed by the install
/// phase into the remote user's home.
pub fn deploy_tool() -> &'static str {
    "$HOME/.local/bin/ceph-deploy"
}

/// Space-separated hostname list for deploy-tool invocations.
pub fn hostnames(nodes: &[&Node]) -> String {
    nodes
        .iter()
        .map(|n| n.hostname.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
