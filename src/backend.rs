//! Storage backend strategy.
//!
//! The start and stop phases share one step sequence; the backends differ
//! only in how OSDs are booted and torn down and in one config rule. Both
//! variants live here so the orchestrators stay backend-agnostic.

use std::fmt;

use crate::daemons::osd;
use crate::designation::Topology;
use crate::fanout;
use crate::report;
use crate::reservation::Node;
use crate::runner::StepResult;
use crate::session::SessionPool;

/// How OSD daemons store their objects.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// RAM-backed object store; every OSD instance allocates
    /// `storage_size` bytes of memory.
    Memstore { storage_size: u64 },
    /// Device-backed object store consuming each node's `device_path`.
    /// `use_ceph_volume` boots through ceph-volume on the node instead of
    /// the deploy tool on the admin.
    Bluestore { use_ceph_volume: bool },
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memstore { .. } => write!(f, "memstore"),
            StorageBackend::Bluestore { .. } => write!(f, "bluestore"),
        }
    }
}

impl StorageBackend {
    /// Backend-specific `[global]` config rules.
    pub fn config_rules(&self) -> Vec<(String, String)> {
        match self {
            StorageBackend::Memstore { storage_size } => vec![
                ("osd objectstore".to_string(), "memstore".to_string()),
                ("memstore device bytes".to_string(), storage_size.to_string()),
            ],
            StorageBackend::Bluestore { .. } => {
                vec![("osd objectstore".to_string(), "bluestore".to_string())]
            }
        }
    }

    /// Boot every OSD instance across the topology's OSD nodes.
    ///
    /// Node-local boots fan out (one task per node); admin-driven boots run
    /// in sequence on the admin session.
    pub fn boot_osds(
        &self,
        pool: &SessionPool,
        admin: &Node,
        topology: &Topology<'_>,
    ) -> Vec<StepResult> {
        match self {
            StorageBackend::Memstore { .. } => join_fanout(
                &topology.osds,
                fanout::run_all(&topology.osds, |node| osd::boot_memstore_node(pool, node)),
            ),
            StorageBackend::Bluestore { use_ceph_volume: true } => join_fanout(
                &topology.osds,
                fanout::run_all(&topology.osds, |node| {
                    osd::boot_bluestore_volume_node(pool, node)
                }),
            ),
            StorageBackend::Bluestore { use_ceph_volume: false } => topology
                .osds
                .iter()
                .flat_map(|node| osd::boot_bluestore_deploy(pool, admin, node))
                .collect(),
        }
    }

    /// Best-effort teardown of stale OSD daemons before a fresh boot.
    pub fn teardown_osds(&self, pool: &SessionPool, admin: &Node, topology: &Topology<'_>) {
        let stopped = osd::stop_target_all(pool, &topology.osds);
        report::record_failures("stop stale OSDs", &stopped);

        let instance_count = topology.osd_instance_count();
        match self {
            StorageBackend::Memstore { .. } => {
                osd::deregister_stale(pool, admin, instance_count, 0);
            }
            StorageBackend::Bluestore { .. } => {
                // Device-backed clusters may have burned through extra ids
                // across re-runs; sweep a wider range, then release the
                // devices themselves.
                osd::deregister_stale(pool, admin, instance_count, 20);
                let zapped = osd::zap_devices(pool, &topology.osds);
                report::record_failures("zap stale OSD devices", &zapped);
            }
        }
    }

    /// Stop-phase command surface: memstore teardown only needs the daemon
    /// targets stopped; bluestore additionally zaps devices.
    pub fn stop_osds(&self, pool: &SessionPool, topology: &Topology<'_>) {
        let stopped = osd::stop_target_all(pool, &topology.osds);
        report::record_failures("stop OSDs", &stopped);
        if let StorageBackend::Bluestore { .. } = self {
            let zapped = osd::zap_devices(pool, &topology.osds);
            report::record_failures("zap OSD devices", &zapped);
        }
    }
}

fn join_fanout(nodes: &[&Node], results: Vec<Option<StepResult>>) -> Vec<StepResult> {
    results
        .into_iter()
        .zip(nodes)
        .map(|(result, node)| {
            result.unwrap_or_else(|| StepResult::aborted(node, "task died".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        let memstore = StorageBackend::Memstore { storage_size: 1 };
        let bluestore = StorageBackend::Bluestore {
            use_ceph_volume: false,
        };
        assert_eq!(memstore.to_string(), "memstore");
        assert_eq!(bluestore.to_string(), "bluestore");
    }

    #[test]
    fn test_config_rules_differ_per_backend() {
        let memstore = StorageBackend::Memstore {
            storage_size: 10 * 1024,
        };
        let rules = memstore.config_rules();
        assert!(rules
            .iter()
            .any(|(k, v)| k == "memstore device bytes" && v == "10240"));

        let bluestore = StorageBackend::Bluestore {
            use_ceph_volume: true,
        };
        let rules = bluestore.config_rules();
        assert!(rules
            .iter()
            .any(|(k, v)| k == "osd objectstore" && v == "bluestore"));
    }
}
