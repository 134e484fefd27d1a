/// Resource Monitor - concurrent time/memory watchdog for one process
///
/// **State machine:** `Idle` (constructed) → `Monitoring` (attached to a pid)
/// → `Stopped` (stop requested, or the process is gone).
///
/// **Synchronization:**
/// - The watch task is the only writer of the report; it hands it back
///   through its join handle when the supervisor stops it.
/// - A breach is announced once over a oneshot channel. The monitor never
///   signals the process itself: the supervisor owns the child handle and
///   performs the kill, so a recycled pid can never be hit.
///
/// **Known approximation:**
/// The monitor attaches after spawn. A process that exits before the first
/// sample reports zero (or partial) peak memory and no violation.
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Monitoring,
    Stopped,
}

/// Which limit was breached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breach {
    Time,
    Memory,
}

/// Snapshot published by the monitor when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub timed_out: bool,
    pub memory_exceeded: bool,
    pub peak_memory_bytes: u64,
}

impl MonitorReport {
    pub fn peak_memory_kb(&self) -> u64 {
        self.peak_memory_bytes / 1024
    }
}

/// Resident set size of `pid` in bytes, read from `/proc/<pid>/status`.
///
/// `None` once the process has exited (the entry is gone, or a zombie with
/// no `VmRSS` line).
pub fn resident_memory_bytes(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// An unattached monitor carrying the limits to enforce
#[derive(Debug, Clone)]
pub struct ResourceMonitor {
    time_limit: Duration,
    memory_limit_bytes: u64,
    poll_interval: Duration,
}

impl ResourceMonitor {
    pub fn new(time_limit_ms: u64, memory_limit_mb: u64) -> Self {
        Self {
            time_limit: Duration::from_millis(time_limit_ms),
            memory_limit_bytes: memory_limit_mb.saturating_mul(1024 * 1024),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::Idle
    }

    /// Start watching a live process
    pub fn attach(self, pid: u32) -> MonitorHandle {
        self.attach_with(pid, resident_memory_bytes)
    }

    fn attach_with<F>(self, pid: u32, sample: F) -> MonitorHandle
    where
        F: Fn(u32) -> Option<u64> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (breach_tx, breach_rx) = oneshot::channel();
        let task = tokio::spawn(self.watch(pid, sample, stop_rx, breach_tx));

        MonitorHandle {
            stop_tx: Some(stop_tx),
            breach_rx: Some(breach_rx),
            task: Some(task),
            report: None,
        }
    }

    async fn watch<F>(
        self,
        pid: u32,
        sample: F,
        mut stop_rx: oneshot::Receiver<()>,
        breach_tx: oneshot::Sender<Breach>,
    ) -> MonitorReport
    where
        F: Fn(u32) -> Option<u64>,
    {
        let started = Instant::now();
        let mut report = MonitorReport::default();
        let mut breach_tx = Some(breach_tx);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {}
            }

            if started.elapsed() > self.time_limit {
                report.timed_out = true;
                debug!(pid, elapsed_ms = started.elapsed().as_millis() as u64, "Time limit breached");
                if let Some(tx) = breach_tx.take() {
                    let _ = tx.send(Breach::Time);
                }
                break;
            }

            let Some(current) = sample(pid) else {
                // Process is gone
                break;
            };
            report.peak_memory_bytes = report.peak_memory_bytes.max(current);

            if report.peak_memory_bytes > self.memory_limit_bytes {
                report.memory_exceeded = true;
                debug!(pid, peak_bytes = report.peak_memory_bytes, "Memory limit breached");
                if let Some(tx) = breach_tx.take() {
                    let _ = tx.send(Breach::Memory);
                }
                break;
            }
        }

        report
    }
}

/// Handle to a running monitor, owned by the supervisor
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    breach_rx: Option<oneshot::Receiver<Breach>>,
    task: Option<JoinHandle<MonitorReport>>,
    report: Option<MonitorReport>,
}

impl MonitorHandle {
    pub fn state(&self) -> MonitorState {
        if self.report.is_some() {
            MonitorState::Stopped
        } else {
            MonitorState::Monitoring
        }
    }

    /// Resolves when the monitor asks for the process to be terminated.
    /// Stays pending if the monitor finishes without a breach.
    pub async fn breached(&mut self) -> Breach {
        let breach = match self.breach_rx.as_mut() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        self.breach_rx = None;

        match breach {
            Some(breach) => breach,
            None => std::future::pending().await,
        }
    }

    /// Stop monitoring and read the final report.
    ///
    /// Idempotent: later calls return the same report. Safe after the
    /// process has exited.
    pub async fn stop(&mut self) -> MonitorReport {
        if let Some(report) = self.report {
            return report;
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let report = match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                warn!(error = %e, "Resource monitor task failed");
                MonitorReport::default()
            }),
            None => MonitorReport::default(),
        };

        self.report = Some(report);
        report
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
