//! Reduces raw Prometheus exposition payloads to compact per-exporter
//! snapshots (spec.md §4.4).

pub mod grammar;
pub mod node;
pub mod process;

use serde::{Deserialize, Serialize};

pub use node::NodeSnapshot;
pub use process::ProcessGroupSnapshot;

/// The two snapshot variants the drainer knows how to produce, tagged
/// so a batch can mix exporter families without losing field names on
/// the wire. `exporter_client::ExporterKind` decides which variant a
/// given buffered file is parsed into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    Node(NodeSnapshot),
    ProcessGroup(ProcessGroupSnapshot),
}

impl Snapshot {
    /// Parse `payload` as the exporter family named `exporter_name`.
    ///
    /// `process_exporter`-family payloads expand to one [`Snapshot`] per
    /// non-empty process group; every other family is treated as
    /// node-exporter style and yields exactly one snapshot, possibly
    /// zero-valued.
    #[must_use]
    pub fn parse_all(exporter_name: &str, payload: &[u8]) -> Vec<Self> {
        if exporter_name == "process_exporter" {
            process::parse(payload)
                .into_values()
                .map(Snapshot::ProcessGroup)
                .collect()
        } else {
            vec![Snapshot::Node(node::parse(payload))]
        }
    }

    /// A zero-valued snapshot of the variant appropriate for
    /// `exporter_name`, used by the drainer when parsing fails outright
    /// (spec.md §4.5 step 3: "substitute a zero-valued snapshot").
    #[must_use]
    pub fn zero_valued(exporter_name: &str) -> Self {
        if exporter_name == "process_exporter" {
            Snapshot::ProcessGroup(ProcessGroupSnapshot::default())
        } else {
            Snapshot::Node(NodeSnapshot::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_node_family_yields_single_snapshot() {
        let snapshots = Snapshot::parse_all("node_exporter", b"node_load1 0.1\n");
        assert_eq!(snapshots.len(), 1);
        assert!(matches!(snapshots[0], Snapshot::Node(_)));
    }

    #[test]
    fn parse_all_process_family_yields_one_per_group() {
        let payload = br#"
namedprocess_namegroup_num_procs{groupname="nginx"} 1
namedprocess_namegroup_num_procs{groupname="redis"} 2
"#;
        let snapshots = Snapshot::parse_all("process_exporter", payload);
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| matches!(s, Snapshot::ProcessGroup(_))));
    }

    #[test]
    fn zero_valued_matches_exporter_family() {
        assert!(matches!(
            Snapshot::zero_valued("process_exporter"),
            Snapshot::ProcessGroup(_)
        ));
        assert!(matches!(Snapshot::zero_valued("node_exporter"), Snapshot::Node(_)));
    }

    #[test]
    fn stamper_then_parse_ignores_appended_timestamps() {
        use crate::stamper;
        use chrono::Utc;

        let payload = b"node_load1 0.42\n";
        let direct = node::parse(payload);
        let stamped = stamper::stamp(payload, Utc::now());
        let via_stamped = node::parse(&stamped);

        assert!((direct.load1 - via_stamped.load1).abs() < f64::EPSILON);
    }
}
