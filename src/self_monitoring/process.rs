//! Tracks resource consumption of the agent's own process, so a memory
//! leak or CPU spike in the agent itself is visible on its own
//! `/metrics` surface rather than only showing up as missed drains.

use prometheus::{Counter, Gauge, IntGauge, Opts, Registry};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ProcessMonitor {
    cpu_seconds_total: Counter,
    cpu_cores: IntGauge,
    resident_memory_bytes: IntGauge,
    virtual_memory_bytes: IntGauge,
    threads: IntGauge,
    start_time_seconds: Gauge,
    state: Arc<Mutex<MonitorState>>,
    pid: Pid,
}

struct MonitorState {
    system: System,
    last_cpu_time: Option<Duration>,
    last_collection: Option<Instant>,
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMonitor {
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let cpu_seconds_total = Counter::with_opts(Opts::new(
            "nodepulse_agent_process_cpu_seconds_total",
            "Total user and system CPU time spent by the agent process, in seconds",
        ))
        .expect("nodepulse_agent_process_cpu_seconds_total");

        let cpu_cores = IntGauge::with_opts(Opts::new(
            "nodepulse_agent_process_cpu_cores",
            "Number of CPU cores available to the system",
        ))
        .expect("nodepulse_agent_process_cpu_cores");

        let resident_memory_bytes = IntGauge::with_opts(Opts::new(
            "nodepulse_agent_process_resident_memory_bytes",
            "Resident memory size in bytes (RSS)",
        ))
        .expect("nodepulse_agent_process_resident_memory_bytes");

        let virtual_memory_bytes = IntGauge::with_opts(Opts::new(
            "nodepulse_agent_process_virtual_memory_bytes",
            "Virtual memory size in bytes (VSZ)",
        ))
        .expect("nodepulse_agent_process_virtual_memory_bytes");

        let threads = IntGauge::with_opts(Opts::new(
            "nodepulse_agent_process_threads",
            "Number of OS threads in the process",
        ))
        .expect("nodepulse_agent_process_threads");

        let start_time_seconds = Gauge::with_opts(Opts::new(
            "nodepulse_agent_process_start_time_seconds",
            "Start time of the process since unix epoch, in seconds",
        ))
        .expect("nodepulse_agent_process_start_time_seconds");

        let system = System::new_all();
        let num_cores = system.cpus().len().max(1);
        #[allow(clippy::cast_possible_wrap)]
        cpu_cores.set(num_cores as i64);

        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        start_time_seconds.set(start_time);

        let pid = Pid::from(std::process::id() as usize);
        let state = Arc::new(Mutex::new(MonitorState {
            system,
            last_cpu_time: None,
            last_collection: None,
        }));

        Self {
            cpu_seconds_total,
            cpu_cores,
            resident_memory_bytes,
            virtual_memory_bytes,
            threads,
            start_time_seconds,
            state,
            pid,
        }
    }

    /// # Errors
    /// Returns an error if a metric is already registered under the
    /// same name (only possible via a programming mistake).
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.cpu_seconds_total.clone()))?;
        registry.register(Box::new(self.cpu_cores.clone()))?;
        registry.register(Box::new(self.resident_memory_bytes.clone()))?;
        registry.register(Box::new(self.virtual_memory_bytes.clone()))?;
        registry.register(Box::new(self.threads.clone()))?;
        registry.register(Box::new(self.start_time_seconds.clone()))?;
        Ok(())
    }

    /// Refresh the OS-reported stats. Call this just before the
    /// `/metrics` handler gathers the registry, not on a timer: there's
    /// no reason to pay the `/proc` read between scrapes.
    pub fn refresh(&self) {
        let now = Instant::now();
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("process monitor state mutex poisoned, recovering");
                poisoned.into_inner()
            }
        };

        state.system.refresh_all();

        let Some(process) = state.system.process(self.pid) else {
            return;
        };

        #[allow(clippy::cast_possible_wrap)]
        {
            self.resident_memory_bytes.set(process.memory() as i64);
            self.virtual_memory_bytes.set(process.virtual_memory() as i64);
        }

        let current_cpu_time = Duration::from_secs(process.run_time());
        if let (Some(last_cpu), Some(last_collection)) = (state.last_cpu_time, state.last_collection) {
            let elapsed = now.duration_since(last_collection);
            if elapsed.as_secs_f64() > 0.1 {
                let delta = current_cpu_time.saturating_sub(last_cpu).as_secs_f64();
                if delta > 0.0 {
                    self.cpu_seconds_total.inc_by(delta);
                }
            }
        }
        state.last_cpu_time = Some(current_cpu_time);
        state.last_collection = Some(now);

        #[cfg(target_os = "linux")]
        if let Ok(entries) = std::fs::read_dir(format!("/proc/{}/task", self.pid)) {
            #[allow(clippy::cast_possible_wrap)]
            self.threads.set(entries.count() as i64);
        }
        #[cfg(not(target_os = "linux"))]
        self.threads.set(1);

        debug!(
            rss_bytes = self.resident_memory_bytes.get(),
            cpu_seconds_total = self.cpu_seconds_total.get(),
            "refreshed self-process metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_start_time_and_cores() {
        let monitor = ProcessMonitor::new();
        assert!(monitor.start_time_seconds.get() > 0.0);
        assert!(monitor.cpu_cores.get() > 0);
    }

    #[test]
    fn registers_without_error() {
        let monitor = ProcessMonitor::new();
        let registry = Registry::new();
        assert!(monitor.register(&registry).is_ok());
    }

    #[test]
    fn refresh_populates_memory_metrics() {
        let monitor = ProcessMonitor::new();
        monitor.refresh();
        assert!(monitor.resident_memory_bytes.get() > 0);
        assert!(monitor.virtual_memory_bytes.get() >= monitor.resident_memory_bytes.get());
    }

    #[test]
    fn repeated_refresh_does_not_panic() {
        let monitor = ProcessMonitor::new();
        for _ in 0..5 {
            monitor.refresh();
        }
    }
}
