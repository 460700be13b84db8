//! One polling cycle: gather every metric family, convert to tuples, deliver.
//!
//! Families are attempted in a fixed order and isolated from each other: a
//! family reporting `Unavailable` is silently left out of the batch, any other
//! failure is logged through the general throttle slot and the family is
//! skipped for this cycle. CPU-count lookup failures go through their own
//! throttle slot so they never reset the general window.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error};

use crate::collector::PerfCollector;
use crate::collectors::uptime::CpuTimes;
use crate::error::CollectorError;
use crate::metric::{
    tags, MetricFactory, MetricTuple, Tags, TAG_BYTES, TAG_DISK_SIZE_MB, TAG_MEMORY_SIZE_MB,
    TAG_MOUNT_ID, TAG_NETWORK_DEVICE_ID, TAG_TOTAL_CPUS,
};
use crate::throttle::{ErrorKey, ErrorThrottle};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Receives one batch per cycle. An error is logged and does not stop the
/// polling loop.
pub type MetricsCallback = Box<dyn FnMut(Vec<MetricTuple>) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Liveness,
    Memory,
    Processor,
    LogicalDisks,
    Network,
}

/// Gather order.
pub const FAMILIES: [Family; 5] = [
    Family::Liveness,
    Family::Memory,
    Family::Processor,
    Family::LogicalDisks,
    Family::Network,
];

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::Liveness => "liveness",
            Family::Memory => "memory",
            Family::Processor => "processor",
            Family::LogicalDisks => "logical disks",
            Family::Network => "network",
        };
        f.write_str(name)
    }
}

/// Previous cumulative uptime/idle pair, seeded from baseline.
#[derive(Debug, Default)]
pub struct CpuTimeTracker {
    previous: Option<CpuTimes>,
}

impl CpuTimeTracker {
    pub fn initialize_from_baseline(&mut self, baseline: CpuTimes) {
        self.previous = Some(baseline);
    }

    /// Returns `(uptime_delta, idle_delta)` since the previous call and
    /// remembers `current`.
    pub fn delta(&mut self, current: CpuTimes) -> Result<CpuTimes, CollectorError> {
        let previous = self.previous.ok_or(CollectorError::NotBaselined)?;
        self.previous = Some(current);
        Ok(CpuTimes {
            uptime: current.uptime - previous.uptime,
            idle: current.idle - previous.idle,
        })
    }
}

/// Busy percentage over an interval. Idle seconds in /proc/uptime are summed
/// over all CPUs, so they are normalised by the CPU count when it is known.
pub fn utilization_percent(delta: CpuTimes, cpus: Option<usize>) -> Result<f64, CollectorError> {
    if delta.uptime == 0.0 {
        return Err(CollectorError::unavailable("uptime delta is zero"));
    }
    let cpus = cpus.unwrap_or(1).max(1) as f64;
    let percent = 100.0 * (1.0 - delta.idle / (delta.uptime * cpus));
    Ok(percent.clamp(0.0, 100.0))
}

/// Drives one collector through repeated gathers.
///
/// The general throttle slot holds one key at a time. Two different errors
/// that persist in different families replace each other in that slot, so
/// both are logged on every cycle.
pub struct PollingLoop {
    collector: Box<dyn PerfCollector>,
    computer: Option<String>,
    factory: Option<MetricFactory>,
    cpu_times: CpuTimeTracker,
    saved_error: ErrorThrottle,
    saved_cpu_error: ErrorThrottle,
    callback: MetricsCallback,
}

impl PollingLoop {
    pub fn new(
        collector: Box<dyn PerfCollector>,
        computer: Option<String>,
        callback: MetricsCallback,
    ) -> Self {
        Self {
            collector,
            computer,
            factory: None,
            cpu_times: CpuTimeTracker::default(),
            saved_error: ErrorThrottle::default(),
            saved_cpu_error: ErrorThrottle::default(),
            callback,
        }
    }

    /// Baselines the collector and resolves the machine ids stamped on every
    /// tuple. The loop must not run if this fails.
    pub fn initialize(&mut self) -> Result<(), CollectorError> {
        let baseline = self.collector.baseline()?;
        self.cpu_times.initialize_from_baseline(baseline);
        let mma_ids = self.collector.get_mma_ids()?;
        self.factory = Some(MetricFactory::new(&mma_ids, self.computer.clone()));
        Ok(())
    }

    pub fn into_collector(self) -> Box<dyn PerfCollector> {
        self.collector
    }

    /// Gathers one batch and hands it to the callback.
    pub fn run_cycle(&mut self) {
        let batch = self.gather();
        self.deliver(batch);
    }

    pub fn gather(&mut self) -> Vec<MetricTuple> {
        debug!("Gather Data");
        let Some(factory) = self.factory.clone() else {
            self.report_error(&CollectorError::NotBaselined);
            return Vec::new();
        };

        let mut data = Vec::new();
        self.collector.start_sample();
        for family in FAMILIES {
            match self.collect(family, &factory) {
                Ok(tuples) => data.extend(tuples),
                Err(e) if e.is_unavailable() => {
                    debug!("{} metrics unavailable: {}", family, e);
                }
                Err(e) => {
                    if self
                        .saved_error
                        .should_report(ErrorKey::from(&e), Instant::now())
                    {
                        error!("Unexpected error collecting {} metrics: {}", family, e);
                    }
                }
            }
        }
        self.collector.end_sample();
        data
    }

    fn collect(
        &mut self,
        family: Family,
        factory: &MetricFactory,
    ) -> Result<Vec<MetricTuple>, CollectorError> {
        match family {
            Family::Liveness => Ok(vec![factory.tuple("Computer", "Heartbeat", 1.0, Tags::new())]),
            Family::Memory => self.available_memory(factory),
            Family::Processor => self.processor(factory),
            Family::LogicalDisks => self.logical_disks(factory),
            Family::Network => self.network(factory),
        }
    }

    fn available_memory(&self, factory: &MetricFactory) -> Result<Vec<MetricTuple>, CollectorError> {
        let (available_kb, total_kb) = self.collector.get_available_memory_kb()?;
        Ok(vec![factory.tuple(
            "Memory",
            "AvailableMB",
            available_kb as f64 / 1024.0,
            tags([(TAG_MEMORY_SIZE_MB, total_kb as f64 / 1024.0)]),
        )])
    }

    fn processor(&mut self, factory: &MetricFactory) -> Result<Vec<MetricTuple>, CollectorError> {
        let cpus = match self.collector.get_number_of_cpus() {
            Ok(count) => Some(count),
            Err(e) => {
                if self
                    .saved_cpu_error
                    .should_report(ErrorKey::from(&e), Instant::now())
                {
                    error!("Unable to get number of CPUs: {}", e);
                }
                None
            }
        };

        let current = self.collector.get_cpu_idle()?;
        let delta = self.cpu_times.delta(current)?;
        let percent = utilization_percent(delta, cpus)?;

        let mut tag_map = Tags::new();
        if let Some(count) = cpus {
            tag_map.insert(TAG_TOTAL_CPUS.to_string(), count.into());
        }
        Ok(vec![factory.tuple(
            "Processor",
            "UtilizationPercentage",
            percent,
            tag_map,
        )])
    }

    fn logical_disks(&self, factory: &MetricFactory) -> Result<Vec<MetricTuple>, CollectorError> {
        let mut result = Vec::new();
        for fs in self.collector.get_filesystems()? {
            let mount = fs.mount_point.clone();
            result.push(factory.tuple("LogicalDisk", "Status", 1.0, tags([(TAG_MOUNT_ID, mount.clone())])));
            result.push(factory.tuple(
                "LogicalDisk",
                "FreeSpacePercentage",
                100.0 * fs.free_bytes as f64 / fs.size_bytes as f64,
                tags([(TAG_MOUNT_ID, mount.clone())]),
            ));
            let mut free_tags = tags([(TAG_MOUNT_ID, mount)]);
            free_tags.insert(
                TAG_DISK_SIZE_MB.to_string(),
                (fs.size_bytes / BYTES_PER_MB).into(),
            );
            result.push(factory.tuple(
                "LogicalDisk",
                "FreeSpaceMB",
                (fs.free_bytes / BYTES_PER_MB) as f64,
                free_tags,
            ));
        }
        Ok(result)
    }

    fn network(&mut self, factory: &MetricFactory) -> Result<Vec<MetricTuple>, CollectorError> {
        let mut result = Vec::new();
        for d in self.collector.get_net_stats()? {
            let seconds = d.delta_time.as_secs_f64();
            if seconds <= 0.0 {
                continue;
            }
            for (name, bytes) in [
                ("ReadBytesPerSecond", d.bytes_received),
                ("WriteBytesPerSecond", d.bytes_sent),
            ] {
                let mut tag_map = tags([(TAG_NETWORK_DEVICE_ID, d.device.clone())]);
                tag_map.insert(TAG_BYTES.to_string(), bytes.into());
                result.push(factory.tuple("Network", name, bytes as f64 / seconds, tag_map));
            }
        }
        Ok(result)
    }

    fn deliver(&mut self, batch: Vec<MetricTuple>) {
        let count = batch.len();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(batch)));
        match outcome {
            Ok(Ok(())) => debug!("Delivered {} metrics", count),
            Ok(Err(e)) => error!("Unexpected error from metrics callback: {:#}", e),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Metrics callback panicked: {}", message);
            }
        }
    }

    fn report_error(&mut self, e: &CollectorError) {
        if self.saved_error.should_report(ErrorKey::from(e), Instant::now()) {
            error!("{}", e);
        }
    }
}
