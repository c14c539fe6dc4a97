//! Aggregation rules for process-exporter style payloads (spec.md §4.4).

use super::grammar::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `groupname`'s worth of process-exporter metrics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessGroupSnapshot {
    pub timestamp: Option<DateTime<Utc>>,
    pub group: String,
    pub num_procs: f64,
    pub cpu_seconds_total: f64,
    pub resident_memory_bytes: f64,
}

/// Parse a process-exporter exposition payload into one snapshot per
/// `groupname`, dropping groups whose `num_procs` is zero.
///
/// Malformed lines are skipped. An empty or comment-only payload yields
/// an empty map, never an error.
#[must_use]
pub fn parse(payload: &[u8]) -> HashMap<String, ProcessGroupSnapshot> {
    let text = String::from_utf8_lossy(payload);
    let samples: Vec<Sample> = text.lines().filter_map(super::grammar::parse_line).collect();

    let now = Utc::now();
    let mut groups: HashMap<String, ProcessGroupSnapshot> = HashMap::new();

    for sample in &samples {
        let Some(group) = sample.label("groupname") else {
            continue;
        };

        let entry = groups.entry(group.to_string()).or_insert_with(|| ProcessGroupSnapshot {
            timestamp: Some(now),
            group: group.to_string(),
            ..ProcessGroupSnapshot::default()
        });

        match sample.name.as_str() {
            "namedprocess_namegroup_num_procs" => entry.num_procs = sample.value,
            "namedprocess_namegroup_cpu_seconds_total" => {
                if matches!(sample.label("mode"), Some("user") | Some("system")) {
                    entry.cpu_seconds_total += sample.value;
                }
            }
            "namedprocess_namegroup_memory_bytes" => {
                if sample.label("memtype") == Some("resident") {
                    entry.resident_memory_bytes = sample.value;
                }
            }
            _ => {}
        }
    }

    groups.retain(|_, snapshot| snapshot.num_procs != 0.0);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_yields_empty_map() {
        assert!(parse(b"").is_empty());
    }

    #[test]
    fn comment_only_payload_yields_empty_map() {
        assert!(parse(b"# HELP x y\n# TYPE x counter\n").is_empty());
    }

    #[test]
    fn sums_user_and_system_cpu_modes() {
        let payload = br#"
namedprocess_namegroup_num_procs{groupname="nginx"} 3
namedprocess_namegroup_cpu_seconds_total{groupname="nginx",mode="user"} 10
namedprocess_namegroup_cpu_seconds_total{groupname="nginx",mode="system"} 5
namedprocess_namegroup_cpu_seconds_total{groupname="nginx",mode="iowait"} 99
"#;
        let groups = parse(payload);
        let nginx = &groups["nginx"];
        assert!((nginx.cpu_seconds_total - 15.0).abs() < f64::EPSILON);
        assert!((nginx.num_procs - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn only_resident_memtype_is_captured() {
        let payload = br#"
namedprocess_namegroup_num_procs{groupname="redis"} 1
namedprocess_namegroup_memory_bytes{groupname="redis",memtype="resident"} 2048
namedprocess_namegroup_memory_bytes{groupname="redis",memtype="virtual"} 999999
"#;
        let groups = parse(payload);
        assert!((groups["redis"].resident_memory_bytes - 2048.0).abs() < f64::EPSILON);
    }

    #[test]
    fn groups_with_zero_procs_are_dropped() {
        let payload = br#"
namedprocess_namegroup_num_procs{groupname="empty"} 0
namedprocess_namegroup_num_procs{groupname="active"} 2
"#;
        let groups = parse(payload);
        assert!(!groups.contains_key("empty"));
        assert!(groups.contains_key("active"));
    }

    #[test]
    fn lines_without_groupname_are_ignored() {
        let payload = b"some_other_metric 1\n";
        assert!(parse(payload).is_empty());
    }
}
