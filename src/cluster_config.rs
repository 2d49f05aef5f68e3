//! Cluster configuration file (ceph.conf) handling.
//!
//! The deploy tool on the admin node generates a skeleton config when the
//! monitors are created (fsid, mon hosts). We merge our rule set into its
//! `[global]` section rather than rewriting the file, preserving unknown
//! keys and sections. When the existing file was written for the other
//! storage backend, the `[global]` section is rebuilt from scratch.

use log::warn;

use crate::backend::StorageBackend;

/// The memstore marker rule; its presence identifies a memstore config.
const MEMSTORE_MARKER: &str = "memstore device bytes";

/// An ordered key/value section list, preserving the source layout.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl ClusterConfig {
    /// Parse an existing config file. Lines that are not `key = value`
    /// pairs or `[section]` headers (comments, blanks) are dropped; this
    /// file is machine-managed on both ends.
    pub fn parse(content: &str) -> ClusterConfig {
        let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                sections.push((line[1..line.len() - 1].trim().to_string(), Vec::new()));
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if let Some(section) = sections.last_mut() {
                    section
                        .1
                        .push((key.trim().to_string(), value.trim().to_string()));
                }
            }
        }
        ClusterConfig { sections }
    }

    /// Whether the `[global]` section carries the memstore marker.
    pub fn is_memstore(&self) -> bool {
        self.get("global", MEMSTORE_MARKER).is_some()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .and_then(|(_, entries)| {
                entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.as_str())
            })
    }

    /// Set a key in a section, replacing an existing value.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let index = match self.sections.iter().position(|(name, _)| name == section) {
            Some(index) => index,
            None => {
                self.sections.push((section.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        let entries = &mut self.sections[index].1;
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Drop a whole section.
    pub fn remove_section(&mut self, section: &str) {
        self.sections.retain(|(name, _)| name != section);
    }

    /// Render back to file form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, entries) in &self.sections {
            out.push_str(&format!("[{}]\n", name));
            for (key, value) in entries {
                out.push_str(&format!("{} = {}\n", key, value));
            }
            out.push('\n');
        }
        out
    }
}

/// Options feeding the managed rule set.
#[derive(Debug, Clone)]
pub struct ConfigRules {
    pub osd_op_threads: u32,
    pub osd_pool_size: u32,
    pub osd_max_obj_size: u64,
    pub use_client_cache: bool,
}

/// Merge the managed rules into an existing config file's content.
///
/// A config written for the other backend gets its `[global]` section
/// rebuilt; otherwise conflicting values are overwritten with a warning so
/// re-runs converge on the managed rule set.
pub fn merge_rules(
    existing: &str,
    rules: &ConfigRules,
    backend: &StorageBackend,
) -> String {
    let mut config = ClusterConfig::parse(existing);

    if config.is_memstore() != matches!(backend, StorageBackend::Memstore { .. }) {
        warn!(
            "existing config is for the other storage backend; rebuilding [global] for {}",
            backend
        );
        config.remove_section("global");
    }

    let mut managed: Vec<(String, String)> = vec![
        (
            "fuse disable pagecache".to_string(),
            if rules.use_client_cache { "false" } else { "true" }.to_string(),
        ),
        ("mon allow pool delete".to_string(), "true".to_string()),
        ("osd class load list".to_string(), "*".to_string()),
        ("osd op threads".to_string(), rules.osd_op_threads.to_string()),
        (
            "osd pool default size".to_string(),
            rules.osd_pool_size.to_string(),
        ),
        (
            "osd_max_object_size".to_string(),
            rules.osd_max_obj_size.to_string(),
        ),
    ];
    managed.extend(backend.config_rules());

    for (key, value) in &managed {
        if let Some(found) = config.get("global", key) {
            if found != value {
                warn!(
                    "config rule conflict: {} was \"{}\", now \"{}\"",
                    key, found, value
                );
            }
        }
        config.set("global", key, value);
    }
    config.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ConfigRules {
        ConfigRules {
            osd_op_threads: 4,
            osd_pool_size: 3,
            osd_max_obj_size: 128 * 1024 * 1024,
            use_client_cache: true,
        }
    }

    #[test]
    fn test_parse_render_roundtrip() {
        let content = "[global]\nfsid = abc-123\nmon host = 10.0.0.1\n";
        let config = ClusterConfig::parse(content);
        assert_eq!(config.get("global", "fsid"), Some("abc-123"));
        let rendered = config.render();
        assert!(rendered.contains("fsid = abc-123"));
    }

    #[test]
    fn test_merge_preserves_skeleton_keys() {
        let existing = "[global]\nfsid = abc-123\n";
        let merged = merge_rules(
            existing,
            &rules(),
            &StorageBackend::Bluestore {
                use_ceph_volume: false,
            },
        );
        assert!(merged.contains("fsid = abc-123"));
        assert!(merged.contains("osd op threads = 4"));
        assert!(merged.contains("osd pool default size = 3"));
    }

    #[test]
    fn test_client_cache_toggle() {
        let merged = merge_rules(
            "",
            &ConfigRules {
                use_client_cache: false,
                ..rules()
            },
            &StorageBackend::Bluestore {
                use_ceph_volume: false,
            },
        );
        assert!(merged.contains("fuse disable pagecache = true"));
    }

    #[test]
    fn test_backend_switch_rebuilds_global() {
        let existing = "[global]\nfsid = abc-123\nmemstore device bytes = 1024\n";
        let merged = merge_rules(
            existing,
            &rules(),
            &StorageBackend::Bluestore {
                use_ceph_volume: false,
            },
        );
        // Rebuilt from scratch: the stale fsid and marker are gone.
        assert!(!merged.contains("fsid"));
        assert!(!merged.contains("memstore device bytes"));
    }

    #[test]
    fn test_memstore_rules_carry_marker() {
        let merged = merge_rules(
            "",
            &rules(),
            &StorageBackend::Memstore {
                storage_size: 4096,
            },
        );
        assert!(merged.contains("osd objectstore = memstore"));
        assert!(merged.contains("memstore device bytes = 4096"));
    }
}
