//! Host data collector.
//!
//! `DataCollector` aggregates the pseudo-file readers and utility invocations
//! in [`crate::collectors`] behind the [`PerfCollector`] trait consumed by the
//! polling scheduler. It starts uninitialized; `baseline()` captures the
//! static host facts and the first counter snapshot, after which the
//! delta-producing getters become usable.

use ahash::AHashMap as HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::collectors::cpuinfo::read_cpu_info;
use crate::collectors::diskstats::{DiskData, DiskInventory};
use crate::collectors::filesystem::{read_filesystems, Filesystem};
use crate::collectors::identity::{load_mma_ids, MmaIds};
use crate::collectors::meminfo::read_available_memory_kb;
use crate::collectors::netdev::{diff_net_data, read_net_data, NetData, RawNetData};
use crate::collectors::uptime::{read_cpu_times, CpuTimes};
use crate::counter::CounterModulus;
use crate::error::CollectorError;

/// Source of host performance data driven by the polling scheduler.
pub trait PerfCollector: Send {
    /// Captures identifiers, CPU facts and initial counters. Returns the
    /// cumulative uptime/idle pair at baseline time.
    fn baseline(&mut self) -> Result<CpuTimes, CollectorError>;

    /// Called before each gather.
    fn start_sample(&mut self) {}

    /// Called after each gather.
    fn end_sample(&mut self) {}

    fn get_mma_ids(&self) -> Result<MmaIds, CollectorError>;

    /// Returns `(available_kb, total_kb)`.
    fn get_available_memory_kb(&self) -> Result<(u64, u64), CollectorError>;

    /// Current absolute uptime/idle snapshot.
    fn get_cpu_idle(&self) -> Result<CpuTimes, CollectorError>;

    fn get_number_of_cpus(&self) -> Result<usize, CollectorError>;

    fn get_filesystems(&self) -> Result<Vec<Filesystem>, CollectorError>;

    /// Traffic per interface since the previous call or baseline.
    fn get_net_stats(&mut self) -> Result<Vec<NetData>, CollectorError>;

    /// I/O for `device` (a `/dev/...` path) since the previous call or
    /// baseline.
    fn get_disk_stats(&mut self, device: &str) -> Result<DiskData, CollectorError>;
}

/// State captured by `baseline()`.
struct Baseline {
    mma_ids: Option<MmaIds>,
    cpu_count: Result<usize, String>,
    modulus: CounterModulus,
    saved_net_data: HashMap<String, RawNetData>,
}

pub struct DataCollector {
    root: PathBuf,
    baseline: Option<Baseline>,
    disks: DiskInventory,
}

impl Default for DataCollector {
    fn default() -> Self {
        Self::new("/")
    }
}

impl DataCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            disks: DiskInventory::new(root.clone()),
            root,
            baseline: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Modulus selected at baseline, if baseline has run.
    pub fn counter_modulus(&self) -> Option<CounterModulus> {
        self.baseline.as_ref().map(|b| b.modulus)
    }

    fn baselined(&self) -> Result<&Baseline, CollectorError> {
        self.baseline.as_ref().ok_or(CollectorError::NotBaselined)
    }
}

impl PerfCollector for DataCollector {
    fn baseline(&mut self) -> Result<CpuTimes, CollectorError> {
        let mma_ids = load_mma_ids(&self.root);
        let cpu = read_cpu_info(&self.root);
        let modulus = CounterModulus::from_word_width(cpu.is_64_bit);
        let cpu_count = cpu.count.map_err(|e| e.to_string());
        if let Err(e) = &cpu_count {
            debug!("CPU count unavailable at baseline: {}", e);
        }

        let saved_net_data = read_net_data(&self.root)?;
        self.disks.baseline();

        info!(
            "Collector baseline: {} interfaces, counter modulus {:?}",
            saved_net_data.len(),
            modulus
        );
        self.baseline = Some(Baseline {
            mma_ids,
            cpu_count,
            modulus,
            saved_net_data,
        });

        read_cpu_times(&self.root)
    }

    fn get_mma_ids(&self) -> Result<MmaIds, CollectorError> {
        self.baselined()?
            .mma_ids
            .clone()
            .ok_or_else(|| CollectorError::unavailable("no MMA ids found"))
    }

    fn get_available_memory_kb(&self) -> Result<(u64, u64), CollectorError> {
        read_available_memory_kb(&self.root)
    }

    fn get_cpu_idle(&self) -> Result<CpuTimes, CollectorError> {
        read_cpu_times(&self.root)
    }

    fn get_number_of_cpus(&self) -> Result<usize, CollectorError> {
        match &self.baselined()?.cpu_count {
            Ok(count) => Ok(*count),
            Err(message) => Err(CollectorError::Unavailable(message.clone())),
        }
    }

    fn get_filesystems(&self) -> Result<Vec<Filesystem>, CollectorError> {
        read_filesystems(&self.root).map_err(|e| match e {
            CollectorError::Unavailable(_) => e,
            other => CollectorError::Unavailable(other.to_string()),
        })
    }

    fn get_net_stats(&mut self) -> Result<Vec<NetData>, CollectorError> {
        let modulus = self.baselined()?.modulus;
        let current = read_net_data(&self.root)?;
        let baseline = self.baseline.as_mut().ok_or(CollectorError::NotBaselined)?;
        let result = diff_net_data(&baseline.saved_net_data, &current, modulus);
        baseline.saved_net_data = current;
        Ok(result)
    }

    fn get_disk_stats(&mut self, device: &str) -> Result<DiskData, CollectorError> {
        if !device.starts_with("/dev") {
            return Err(CollectorError::InvalidDevice(device.to_string()));
        }
        let modulus = self.baselined()?.modulus;
        self.disks.get_disk_stats(device, modulus)
    }
}
