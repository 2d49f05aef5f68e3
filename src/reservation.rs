//! Reservation handling: the in-memory directory of cluster nodes.
//!
//! The reservation provider is an external service; we only consume its
//! output, a JSON list of node records. The free-form `extra_info` string map
//! on each record is validated into typed fields exactly once, here, so later
//! phases never re-parse strings mid-step.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::designation::Designation;
use crate::error::{DeployError, Result};

/// Opaque numeric node identity, assigned by the reservation provider.
pub type NodeId = u64;

/// Wire format of one node as emitted by the reservation provider.
///
/// Only `user` and `designations` keys of `extra_info` are interpreted here;
/// `device_path` matters for device-backed storage and everything else is
/// carried along untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub hostname: String,
    pub ip_public: String,
    pub ip_local: String,
    #[serde(default)]
    pub extra_info: BTreeMap<String, String>,
}

impl NodeRecord {
    /// Validate this record into a typed [`Node`].
    pub fn into_node(self) -> Result<Node> {
        let user = self
            .extra_info
            .get("user")
            .cloned()
            .ok_or_else(|| {
                DeployError::configuration(format!(
                    "node {} ({}) has no \"user\" in its extra info",
                    self.id, self.hostname
                ))
            })?;
        let designations = match self.extra_info.get("designations") {
            Some(raw) => Designation::parse_all(raw).map_err(|e| {
                DeployError::configuration(format!("node {}: {}", self.id, e))
            })?,
            None => Vec::new(),
        };
        let device_path = self.extra_info.get("device_path").cloned();

        Ok(Node {
            id: self.id,
            hostname: self.hostname,
            ip_public: self.ip_public,
            ip_local: self.ip_local,
            user,
            designations,
            device_path,
            extra_info: self.extra_info,
        })
    }
}

/// One cluster node, with its metadata validated.
///
/// Immutable after reservation load, except for the planner-applied uniform
/// `device_path` override (see [`Reservation::override_device_path`]).
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub hostname: String,
    pub ip_public: String,
    pub ip_local: String,
    /// SSH login user; identical across all nodes of a valid run.
    pub user: String,
    /// Parsed designation multiset; repeats matter for `osd` only.
    pub designations: Vec<Designation>,
    /// Backing device(s) for device-backed OSD nodes, comma-separated.
    pub device_path: Option<String>,
    /// Raw provider metadata, kept for round-trips.
    pub extra_info: BTreeMap<String, String>,
}

impl Node {
    /// Whether this node holds the given designation at least once.
    pub fn has(&self, designation: Designation) -> bool {
        self.designations.contains(&designation)
    }

    /// Number of OSD daemon instances this node hosts.
    pub fn osd_instances(&self) -> usize {
        self.designations
            .iter()
            .filter(|d| **d == Designation::Osd)
            .count()
    }

    /// An `user@address` label for log lines.
    pub fn label(&self) -> String {
        format!("{}@{}", self.user, self.ip_public)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (id={})", self.hostname, self.id)
    }
}

/// The node directory for one orchestration run.
#[derive(Debug, Clone)]
pub struct Reservation {
    nodes: Vec<Node>,
}

impl Reservation {
    /// Build a reservation from already-validated nodes.
    ///
    /// Fails when the list is empty: every phase needs at least one node.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(DeployError::configuration(
                "reservation does not contain any nodes",
            ));
        }
        Ok(Self { nodes })
    }

    /// Parse the provider's JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let records: Vec<NodeRecord> = serde_json::from_str(raw)?;
        let nodes = records
            .into_iter()
            .map(NodeRecord::into_node)
            .collect::<Result<Vec<_>>>()?;
        Self::from_nodes(nodes)
    }

    /// Load the provider's JSON document from a file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            DeployError::configuration(format!(
                "failed to read reservation from {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Whether every node shares one SSH username.
    pub fn all_same_user(&self) -> bool {
        self.nodes
            .windows(2)
            .all(|pair| pair[0].user == pair[1].user)
    }

    /// The single SSH username of the cluster.
    ///
    /// Mixed usernames are a configuration error; no remote action may run
    /// against such a reservation.
    pub fn common_user(&self) -> Result<&str> {
        if !self.all_same_user() {
            return Err(DeployError::configuration(
                "nodes have different usernames; all nodes must share one SSH login",
            ));
        }
        Ok(&self.nodes[0].user)
    }

    /// Pick the admin node and return it along with all remaining nodes.
    ///
    /// A single-node reservation short-circuits to that node. An explicit id
    /// is looked up and must exist. Otherwise the node with the smallest
    /// public address wins; ties break by node id, so repeated runs always
    /// pick the same admin.
    pub fn pick_admin(&self, explicit: Option<NodeId>) -> Result<(&Node, Vec<&Node>)> {
        if self.nodes.len() == 1 {
            return Ok((&self.nodes[0], Vec::new()));
        }

        if let Some(id) = explicit {
            let admin = self
                .get(id)
                .ok_or_else(|| DeployError::not_found(format!("no node with id {}", id)))?;
            let rest = self.nodes.iter().filter(|n| n.id != id).collect();
            return Ok((admin, rest));
        }

        let mut ordered: Vec<&Node> = self.nodes.iter().collect();
        ordered.sort_by(|a, b| {
            a.ip_public
                .cmp(&b.ip_public)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok((ordered[0], ordered[1..].to_vec()))
    }

    /// Apply a uniform device path to every node, overriding per-node values.
    pub fn override_device_path(&mut self, device_path: &str) {
        for node in &mut self.nodes {
            node.device_path = Some(device_path.to_string());
            node.extra_info
                .insert("device_path".to_string(), device_path.to_string());
        }
    }
}

#[cfg(test)]
pub mod test_support {
    //! Small constructors for unit tests.
    use super::*;

    /// A node with the given id and designation string, addresses derived
    /// from the id.
    pub fn node_with_designations(id: NodeId, designations: &str) -> Node {
        node(id, &format!("10.0.0.{}", id + 1), "tester", designations)
    }

    /// A fully parameterized test node.
    pub fn node(id: NodeId, ip_public: &str, user: &str, designations: &str) -> Node {
        let mut extra_info = BTreeMap::new();
        extra_info.insert("user".to_string(), user.to_string());
        if !designations.is_empty() {
            extra_info.insert("designations".to_string(), designations.to_string());
        }
        NodeRecord {
            id,
            hostname: format!("node{}", id),
            ip_public: ip_public.to_string(),
            ip_local: format!("192.168.1.{}", id + 1),
            extra_info,
        }
        .into_node()
        .expect("test node must validate")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{node, node_with_designations};
    use super::*;

    #[test]
    fn test_empty_reservation_rejected() {
        let err = Reservation::from_nodes(Vec::new()).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }

    #[test]
    fn test_record_without_user_rejected() {
        let record = NodeRecord {
            id: 7,
            hostname: "node7".to_string(),
            ip_public: "10.0.0.7".to_string(),
            ip_local: "192.168.1.7".to_string(),
            extra_info: BTreeMap::new(),
        };
        let err = record.into_node().unwrap_err();
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn test_from_json_roundtrip() {
        let raw = r#"[
            {"id": 0, "hostname": "a", "ip_public": "1.2.3.4", "ip_local": "10.0.0.1",
             "extra_info": {"user": "ubuntu", "designations": "mon,osd,osd"}},
            {"id": 1, "hostname": "b", "ip_public": "1.2.3.5", "ip_local": "10.0.0.2",
             "extra_info": {"user": "ubuntu"}}
        ]"#;
        let reservation = Reservation::from_json(raw).unwrap();
        assert_eq!(reservation.len(), 2);
        assert_eq!(reservation.get(0).unwrap().osd_instances(), 2);
        assert!(reservation.get(1).unwrap().designations.is_empty());
        assert!(reservation.all_same_user());
    }

    #[test]
    fn test_same_user_detection() {
        let nodes = vec![
            node(0, "10.0.0.1", "alice", "mon"),
            node(1, "10.0.0.2", "bob", "mon"),
        ];
        let reservation = Reservation::from_nodes(nodes).unwrap();
        assert!(!reservation.all_same_user());
        assert!(reservation.common_user().is_err());
    }

    #[test]
    fn test_pick_admin_single_node() {
        let reservation =
            Reservation::from_nodes(vec![node_with_designations(3, "mon")]).unwrap();
        let (admin, rest) = reservation.pick_admin(None).unwrap();
        assert_eq!(admin.id, 3);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_pick_admin_explicit_id() {
        let nodes = vec![
            node_with_designations(0, "mon"),
            node_with_designations(1, "mon"),
            node_with_designations(2, "mon"),
        ];
        let reservation = Reservation::from_nodes(nodes).unwrap();
        let (admin, rest) = reservation.pick_admin(Some(2)).unwrap();
        assert_eq!(admin.id, 2);
        assert_eq!(rest.len(), 2);

        let err = reservation.pick_admin(Some(99)).unwrap_err();
        assert!(matches!(err, DeployError::NotFound(_)));
    }

    #[test]
    fn test_pick_admin_smallest_public_address() {
        let nodes = vec![
            node(0, "10.0.0.30", "u", "mon"),
            node(1, "10.0.0.12", "u", "mon"),
            node(2, "10.0.0.25", "u", "mon"),
        ];
        let reservation = Reservation::from_nodes(nodes).unwrap();
        let (admin, rest) = reservation.pick_admin(None).unwrap();
        assert_eq!(admin.id, 1);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_pick_admin_deterministic() {
        let nodes = vec![
            node(0, "10.0.0.9", "u", "mon"),
            node(1, "10.0.0.9", "u", "mon"),
            node(2, "10.0.0.8", "u", "mon"),
        ];
        let reservation = Reservation::from_nodes(nodes).unwrap();
        let first = reservation.pick_admin(None).unwrap().0.id;
        for _ in 0..5 {
            assert_eq!(reservation.pick_admin(None).unwrap().0.id, first);
        }
        // Duplicate addresses fall back to the id tie-break.
        let nodes = vec![node(5, "10.0.0.9", "u", "mon"), node(4, "10.0.0.9", "u", "mon")];
        let reservation = Reservation::from_nodes(nodes).unwrap();
        assert_eq!(reservation.pick_admin(None).unwrap().0.id, 4);
    }

    #[test]
    fn test_override_device_path() {
        let mut reservation = Reservation::from_nodes(vec![
            node_with_designations(0, "osd"),
            node_with_designations(1, "mon"),
        ])
        .unwrap();
        reservation.override_device_path("/dev/nvme0n1");
        assert!(reservation
            .nodes()
            .iter()
            .all(|n| n.device_path.as_deref() == Some("/dev/nvme0n1")));
    }
}
