//! Aggregation rules for node-exporter style payloads (spec.md §4.4).

use super::grammar::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Filesystem types excluded from the root-filesystem rollup.
const EXCLUDED_FSTYPES: [&str; 5] = ["tmpfs", "devtmpfs", "overlay", "squashfs", "devfs"];

/// Disk device name priority: exact names first, then prefix families.
const DISK_PRIORITY_EXACT: [&str; 3] = ["vda", "sda", "nvme0n1"];
const DISK_PRIORITY_PREFIXES: [&str; 4] = ["vd", "sd", "nvme", "hd"];

/// Network interface priority: exact names first, then "anything else
/// that isn't loopback or a virtual bridge/veth/docker device".
const IFACE_PRIORITY_EXACT: [&str; 2] = ["eth0", "en0"];
const IFACE_EXCLUDED_PREFIXES: [&str; 3] = ["docker", "veth", "virbr"];

/// A flat numeric record derived from one node-exporter scrape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeSnapshot {
    pub timestamp: Option<DateTime<Utc>>,

    /// `node_cpu_seconds_total`, summed over cpus per mode.
    pub cpu_seconds_by_mode: HashMap<String, f64>,
    /// Distinct `cpu` label values observed for the `idle` mode.
    pub core_count: u64,

    pub memory_total_bytes: f64,
    pub memory_free_bytes: f64,
    pub memory_available_bytes: f64,
    pub memory_buffers_bytes: f64,
    pub memory_cached_bytes: f64,
    pub swap_total_bytes: f64,
    pub swap_free_bytes: f64,

    pub root_filesystem_size_bytes: f64,
    pub root_filesystem_free_bytes: f64,
    pub root_filesystem_avail_bytes: f64,

    pub disk_primary_device: Option<String>,
    pub disk_read_bytes_total: f64,
    pub disk_written_bytes_total: f64,
    pub disk_reads_completed_total: f64,
    pub disk_writes_completed_total: f64,

    pub network_primary_device: Option<String>,
    pub network_receive_bytes_total: f64,
    pub network_transmit_bytes_total: f64,

    pub load1: f64,
    pub load5: f64,
    pub load15: f64,

    pub processes_running: f64,
    pub processes_blocked: f64,
    pub processes_total: f64,

    pub uptime_seconds: f64,
}

/// Parse a node-exporter exposition payload into a [`NodeSnapshot`].
///
/// Malformed lines are skipped. An empty or comment-only payload yields
/// a zero-valued snapshot, never an error.
#[must_use]
pub fn parse(payload: &[u8]) -> NodeSnapshot {
    let text = String::from_utf8_lossy(payload);
    let samples: Vec<Sample> = text.lines().filter_map(super::grammar::parse_line).collect();

    let mut snapshot = NodeSnapshot {
        timestamp: Some(Utc::now()),
        ..NodeSnapshot::default()
    };

    let mut idle_cpus: HashSet<String> = HashSet::new();
    let mut boot_time: Option<f64> = None;

    let mut disk_candidates: HashMap<String, DiskAccum> = HashMap::new();
    let mut net_candidates: HashMap<String, NetAccum> = HashMap::new();

    for sample in &samples {
        match sample.name.as_str() {
            "node_cpu_seconds_total" => {
                if let Some(mode) = sample.label("mode") {
                    *snapshot
                        .cpu_seconds_by_mode
                        .entry(mode.to_string())
                        .or_insert(0.0) += sample.value;
                    if mode == "idle" {
                        if let Some(cpu) = sample.label("cpu") {
                            idle_cpus.insert(cpu.to_string());
                        }
                    }
                }
            }
            "node_memory_MemTotal_bytes" => snapshot.memory_total_bytes = sample.value,
            "node_memory_MemFree_bytes" => snapshot.memory_free_bytes = sample.value,
            "node_memory_MemAvailable_bytes" => snapshot.memory_available_bytes = sample.value,
            "node_memory_Buffers_bytes" => snapshot.memory_buffers_bytes = sample.value,
            "node_memory_Cached_bytes" => snapshot.memory_cached_bytes = sample.value,
            "node_memory_SwapTotal_bytes" => snapshot.swap_total_bytes = sample.value,
            "node_memory_SwapFree_bytes" => snapshot.swap_free_bytes = sample.value,

            "node_filesystem_size_bytes" => {
                if is_root_filesystem(sample) {
                    snapshot.root_filesystem_size_bytes = sample.value;
                }
            }
            "node_filesystem_free_bytes" => {
                if is_root_filesystem(sample) {
                    snapshot.root_filesystem_free_bytes = sample.value;
                }
            }
            "node_filesystem_avail_bytes" => {
                if is_root_filesystem(sample) {
                    snapshot.root_filesystem_avail_bytes = sample.value;
                }
            }

            "node_disk_read_bytes_total" => accumulate_disk(&mut disk_candidates, sample, |d, v| d.read_bytes = v),
            "node_disk_written_bytes_total" => {
                accumulate_disk(&mut disk_candidates, sample, |d, v| d.written_bytes = v);
            }
            "node_disk_reads_completed_total" => {
                accumulate_disk(&mut disk_candidates, sample, |d, v| d.reads_completed = v);
            }
            "node_disk_writes_completed_total" => {
                accumulate_disk(&mut disk_candidates, sample, |d, v| d.writes_completed = v);
            }

            "node_network_receive_bytes_total" => {
                accumulate_net(&mut net_candidates, sample, |n, v| n.rx_bytes = v);
            }
            "node_network_transmit_bytes_total" => {
                accumulate_net(&mut net_candidates, sample, |n, v| n.tx_bytes = v);
            }

            "node_load1" => snapshot.load1 = sample.value,
            "node_load5" => snapshot.load5 = sample.value,
            "node_load15" => snapshot.load15 = sample.value,

            "node_procs_running" => snapshot.processes_running = sample.value,
            "node_procs_blocked" => snapshot.processes_blocked = sample.value,
            "node_procs_total" => snapshot.processes_total = sample.value,

            "node_boot_time_seconds" => boot_time = Some(sample.value),

            _ => {}
        }
    }

    snapshot.core_count = idle_cpus.len() as u64;

    if snapshot.processes_total == 0.0 {
        snapshot.processes_total = snapshot.processes_running + snapshot.processes_blocked;
    }

    if let Some(device) = pick_primary_disk(disk_candidates.keys()) {
        if let Some(accum) = disk_candidates.get(&device) {
            snapshot.disk_read_bytes_total = accum.read_bytes;
            snapshot.disk_written_bytes_total = accum.written_bytes;
            snapshot.disk_reads_completed_total = accum.reads_completed;
            snapshot.disk_writes_completed_total = accum.writes_completed;
        }
        snapshot.disk_primary_device = Some(device);
    }

    if let Some(device) = pick_primary_iface(net_candidates.keys()) {
        if let Some(accum) = net_candidates.get(&device) {
            snapshot.network_receive_bytes_total = accum.rx_bytes;
            snapshot.network_transmit_bytes_total = accum.tx_bytes;
        }
        snapshot.network_primary_device = Some(device);
    }

    // node_boot_time_seconds is converted using the parse-time clock, not
    // the collection instant embedded in the payload; see spec.md §9's
    // open question about this racing the aligned timestamps.
    if let Some(boot) = boot_time {
        let now = Utc::now().timestamp() as f64;
        snapshot.uptime_seconds = (now - boot).max(0.0);
    }

    snapshot
}

#[derive(Default)]
struct DiskAccum {
    read_bytes: f64,
    written_bytes: f64,
    reads_completed: f64,
    writes_completed: f64,
}

#[derive(Default)]
struct NetAccum {
    rx_bytes: f64,
    tx_bytes: f64,
}

fn accumulate_disk(
    map: &mut HashMap<String, DiskAccum>,
    sample: &Sample,
    set: impl FnOnce(&mut DiskAccum, f64),
) {
    if let Some(device) = sample.label("device") {
        let entry = map.entry(device.to_string()).or_default();
        set(entry, sample.value);
    }
}

fn accumulate_net(
    map: &mut HashMap<String, NetAccum>,
    sample: &Sample,
    set: impl FnOnce(&mut NetAccum, f64),
) {
    if let Some(device) = sample.label("device") {
        let entry = map.entry(device.to_string()).or_default();
        set(entry, sample.value);
    }
}

fn is_root_filesystem(sample: &Sample) -> bool {
    let mountpoint_is_root = sample.label("mountpoint") == Some("/");
    let fstype_included = sample
        .label("fstype")
        .is_none_or(|fstype| !EXCLUDED_FSTYPES.contains(&fstype));
    mountpoint_is_root && fstype_included
}

fn pick_primary_disk<'a>(candidates: impl Iterator<Item = &'a String>) -> Option<String> {
    pick_primary(candidates, &DISK_PRIORITY_EXACT, &DISK_PRIORITY_PREFIXES, &[])
}

fn pick_primary_iface<'a>(candidates: impl Iterator<Item = &'a String>) -> Option<String> {
    pick_primary(candidates, &IFACE_PRIORITY_EXACT, &[], &IFACE_EXCLUDED_PREFIXES)
}

/// Shared priority-pick: exact names win in listed order, then the
/// first remaining candidate (in sorted order) that isn't "lo" and
/// doesn't start with an excluded prefix, then falls back to prefix
/// matches for device families like disks. Candidates are sorted
/// before either fallback runs so the pick is stable across parses of
/// the same payload — a `HashMap`'s iteration order is randomized per
/// run and must never leak into the result.
fn pick_primary<'a>(
    candidates: impl Iterator<Item = &'a String>,
    exact_priority: &[&str],
    allowed_prefixes: &[&str],
    excluded_prefixes: &[&str],
) -> Option<String> {
    let mut names: Vec<&String> = candidates.collect();
    names.sort();

    for &exact in exact_priority {
        if names.iter().any(|n| n.as_str() == exact) {
            return Some(exact.to_string());
        }
    }

    if !allowed_prefixes.is_empty() {
        for prefix in allowed_prefixes {
            if let Some(name) = names.iter().find(|n| n.starts_with(prefix)) {
                return Some((*name).clone());
            }
        }
        return None;
    }

    names
        .into_iter()
        .find(|n| n.as_str() != "lo" && !excluded_prefixes.iter().any(|p| n.starts_with(p)))
        .cloned()
}
