//! Node designations and cluster topology.
//!
//! A reservation tags each node with zero or more designations (daemon roles).
//! Designations come in as a comma-separated string in the node metadata and
//! are parsed once, at reservation load time. The `osd` designation may be
//! repeated: a node tagged `osd,osd` hosts two OSD daemon instances.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::error::{DeployError, Result};
use crate::reservation::{Node, Reservation};

/// Daemon role a node can be designated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Designation {
    /// Object storage daemon
    Osd,
    /// Cluster monitor
    Mon,
    /// Cluster manager
    Mgr,
    /// Metadata server (cephfs)
    Mds,
}

impl Designation {
    /// Parse a comma-separated designation string into a multiset.
    ///
    /// Tokens are trimmed and matched case-insensitively. Empty tokens are
    /// skipped, so `"mon,,osd"` parses the same as `"mon,osd"`. Unknown
    /// tokens are a configuration error.
    pub fn parse_all(raw: &str) -> Result<Vec<Designation>> {
        let mut out = Vec::new();
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let designation = Designation::from_str(token).map_err(|_| {
                DeployError::configuration(format!("unknown designation \"{}\"", token))
            })?;
            out.push(designation);
        }
        Ok(out)
    }

    /// The systemd target controlling all daemons of this role on a node.
    pub fn daemon_target(&self) -> &'static str {
        match self {
            Designation::Osd => "ceph-osd.target",
            Designation::Mon => "ceph-mon.target",
            Designation::Mgr => "ceph-mgr.target",
            Designation::Mds => "ceph-mds.target",
        }
    }
}

/// Minimum monitor nodes required to start a cluster.
pub const MIN_MONITORS: usize = 3;
/// Minimum manager nodes required to start a cluster.
pub const MIN_MANAGERS: usize = 2;
/// Minimum metadata-server nodes required to start a cluster.
pub const MIN_METADATA_SERVERS: usize = 2;
/// Minimum OSD daemon instances (counting repeats) required to start a cluster.
pub const MIN_OSD_INSTANCES: usize = 3;

/// Partition of a reservation into role buckets.
///
/// Derived once per run; node references stay valid for the reservation's
/// lifetime. A node appears in every bucket it is designated for.
#[derive(Debug)]
pub struct Topology<'a> {
    pub monitors: Vec<&'a Node>,
    pub managers: Vec<&'a Node>,
    pub metadata_servers: Vec<&'a Node>,
    pub osds: Vec<&'a Node>,
    /// Nodes holding at least one designation.
    pub designated: Vec<&'a Node>,
}

impl<'a> Topology<'a> {
    /// Bucket every node of the reservation by its parsed designations.
    pub fn classify(reservation: &'a Reservation) -> Topology<'a> {
        let mut topology = Topology {
            monitors: Vec::new(),
            managers: Vec::new(),
            metadata_servers: Vec::new(),
            osds: Vec::new(),
            designated: Vec::new(),
        };
        for node in reservation.nodes() {
            if node.designations.is_empty() {
                continue;
            }
            topology.designated.push(node);
            if node.has(Designation::Mon) {
                topology.monitors.push(node);
            }
            if node.has(Designation::Mgr) {
                topology.managers.push(node);
            }
            if node.has(Designation::Mds) {
                topology.metadata_servers.push(node);
            }
            if node.has(Designation::Osd) {
                topology.osds.push(node);
            }
        }
        topology
    }

    /// Total OSD daemon instances across the cluster, counting repeats.
    pub fn osd_instance_count(&self) -> usize {
        self.osds.iter().map(|node| node.osd_instances()).sum()
    }

    /// Enforce the minimum role counts needed to boot a cluster.
    ///
    /// Every deficit is reported, not just the first one found.
    pub fn validate_for_start(&self) -> Result<()> {
        let checks: [(Designation, usize, usize); 4] = [
            (Designation::Mon, self.monitors.len(), MIN_MONITORS),
            (Designation::Mgr, self.managers.len(), MIN_MANAGERS),
            (Designation::Mds, self.metadata_servers.len(), MIN_METADATA_SERVERS),
            (Designation::Osd, self.osd_instance_count(), MIN_OSD_INSTANCES),
        ];

        let deficits: Vec<String> = checks
            .iter()
            .filter(|(_, found, required)| found < required)
            .map(|(role, found, required)| {
                format!(
                    "need at least {} \"{}\" (found {}, short {})",
                    required,
                    role,
                    found,
                    required - found
                )
            })
            .collect();

        if deficits.is_empty() {
            Ok(())
        } else {
            Err(DeployError::validation(deficits.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::test_support::node_with_designations;

    #[test]
    fn test_parse_all_case_insensitive() {
        let parsed = Designation::parse_all("MON,osd,Mgr").unwrap();
        assert_eq!(
            parsed,
            vec![Designation::Mon, Designation::Osd, Designation::Mgr]
        );
    }

    #[test]
    fn test_parse_all_preserves_repeats() {
        let parsed = Designation::parse_all("osd,osd,mon").unwrap();
        assert_eq!(
            parsed,
            vec![Designation::Osd, Designation::Osd, Designation::Mon]
        );
    }

    #[test]
    fn test_parse_all_rejects_unknown() {
        let err = Designation::parse_all("mon,flux").unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
        assert!(err.to_string().contains("flux"));
    }

    #[test]
    fn test_parse_all_skips_empty_tokens() {
        let parsed = Designation::parse_all("mon,,osd,").unwrap();
        assert_eq!(parsed, vec![Designation::Mon, Designation::Osd]);
    }

    #[test]
    fn test_display_lowercase() {
        assert_eq!(Designation::Mds.to_string(), "mds");
        assert_eq!(Designation::Osd.daemon_target(), "ceph-osd.target");
    }

    #[test]
    fn test_validate_reports_all_deficits() {
        let nodes = vec![
            node_with_designations(0, "mon"),
            node_with_designations(1, "mon"),
            node_with_designations(2, "mgr,osd"),
        ];
        let reservation = Reservation::from_nodes(nodes).unwrap();
        let topology = Topology::classify(&reservation);
        let err = topology.validate_for_start().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"mon\""), "missing mon deficit: {}", msg);
        assert!(msg.contains("\"mgr\""), "missing mgr deficit: {}", msg);
        assert!(msg.contains("\"mds\""), "missing mds deficit: {}", msg);
        assert!(msg.contains("\"osd\""), "missing osd deficit: {}", msg);
    }

    #[test]
    fn test_osd_instances_count_repeats() {
        let nodes = vec![
            node_with_designations(0, "osd,osd"),
            node_with_designations(1, "osd"),
        ];
        let reservation = Reservation::from_nodes(nodes).unwrap();
        let topology = Topology::classify(&reservation);
        assert_eq!(topology.osds.len(), 2);
        assert_eq!(topology.osd_instance_count(), 3);
    }
}
