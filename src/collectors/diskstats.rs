//! Per-device disk I/O deltas.
//!
//! `DiskInventory` keeps two caches keyed by device path (`/dev/sda`): the
//! logical sector size reported by lsblk, resolved lazily and kept for the
//! lifetime of the device, and the previous raw sample read from
//! /sys/class/block/<dev>/stat.

use ahash::AHashMap as HashMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::collectors::utility::run_utility;
use crate::counter::CounterModulus;
use crate::error::CollectorError;

/// Cumulative counters of one block device at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDiskData {
    pub device: String,
    pub time: Instant,
    pub reads: u64,
    pub read_sectors: u64,
    pub writes: u64,
    pub write_sectors: u64,
    pub sector_size: u64,
}

/// I/O of one block device between two samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskData {
    pub device: String,
    pub delta_time: Duration,
    pub reads: u64,
    pub bytes_read: u64,
    pub writes: u64,
    pub bytes_written: u64,
}

impl RawDiskData {
    pub fn delta_since(&self, previous: &RawDiskData, modulus: CounterModulus) -> DiskData {
        DiskData {
            device: self.device.clone(),
            delta_time: self.time.saturating_duration_since(previous.time),
            reads: modulus.delta(previous.reads, self.reads),
            bytes_read: modulus
                .delta(previous.read_sectors, self.read_sectors)
                .saturating_mul(self.sector_size),
            writes: modulus.delta(previous.writes, self.writes),
            bytes_written: modulus
                .delta(previous.write_sectors, self.write_sectors)
                .saturating_mul(self.sector_size),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(rename = "log-sec", default)]
    log_sec: Option<serde_json::Value>,
}

/// Parses `lsblk -J` output into device path -> logical sector size.
///
/// Older lsblk versions emit numbers as strings; both forms are accepted.
pub fn parse_lsblk(json: &str) -> Result<HashMap<String, u64>, CollectorError> {
    let output: LsblkOutput = serde_json::from_str(json)
        .map_err(|e| CollectorError::unavailable(format!("invalid lsblk output: {}", e)))?;

    let mut sizes = HashMap::new();
    for device in output.blockdevices {
        let size = match device.log_sec {
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        if let Some(size) = size {
            sizes.insert(device.name, size);
        }
    }
    Ok(sizes)
}

/// Parses the stat node of a block device. Fields of interest are reads
/// completed, sectors read, writes completed and sectors written (1-based
/// positions 1, 3, 5 and 7).
pub fn parse_block_stat(
    device: &str,
    content: &str,
    sector_size: u64,
    time: Instant,
) -> Option<RawDiskData> {
    let fields: Vec<&str> = content.lines().next()?.split_whitespace().collect();
    if fields.len() < 7 {
        return None;
    }

    Some(RawDiskData {
        device: device.to_string(),
        time,
        reads: fields[0].parse().unwrap_or(0),
        read_sectors: fields[2].parse().unwrap_or(0),
        writes: fields[4].parse().unwrap_or(0),
        write_sectors: fields[6].parse().unwrap_or(0),
        sector_size,
    })
}

pub struct DiskInventory {
    root: PathBuf,
    sector_sizes: HashMap<String, u64>,
    saved: HashMap<String, RawDiskData>,
}

impl DiskInventory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sector_sizes: HashMap::new(),
            saved: HashMap::new(),
        }
    }

    /// Re-resolves sector sizes for every block device lsblk knows about and
    /// replaces the previous-sample cache with a fresh snapshot.
    ///
    /// Failures are logged; affected devices recover on their first
    /// `get_disk_stats` call.
    pub fn baseline(&mut self) {
        self.saved.clear();
        match self.query_sector_sizes(&[]) {
            Ok(sizes) => self.sector_sizes = sizes,
            Err(e) => {
                warn!("Unable to list block devices: {}", e);
                return;
            }
        }

        for (device, &sector_size) in &self.sector_sizes {
            match self.read_disk_data(device, sector_size) {
                Ok(sample) => {
                    self.saved.insert(device.clone(), sample);
                }
                Err(e) => debug!("No baseline sample for {}: {}", device, e),
            }
        }
        debug!("Disk inventory baseline: {} devices", self.saved.len());
    }

    /// I/O since the previous call (or baseline) for `device`.
    ///
    /// The current sample always replaces the cached one, so a device seen
    /// for the first time fails once with "no previous data" and succeeds on
    /// the next call.
    pub fn get_disk_stats(
        &mut self,
        device: &str,
        modulus: CounterModulus,
    ) -> Result<DiskData, CollectorError> {
        let sector_size = self.sector_size(device)?;
        let current = self.read_disk_data(device, sector_size)?;
        let previous = self.saved.insert(device.to_string(), current.clone());
        match previous {
            Some(previous) => Ok(current.delta_since(&previous, modulus)),
            None => Err(CollectorError::unavailable(format!(
                "no previous data for {}",
                device
            ))),
        }
    }

    pub fn cached_sector_size(&self, device: &str) -> Option<u64> {
        self.sector_sizes.get(device).copied()
    }

    fn sector_size(&mut self, device: &str) -> Result<u64, CollectorError> {
        if let Some(size) = self.sector_sizes.get(device) {
            return Ok(*size);
        }
        let size = self
            .query_sector_sizes(&[device])?
            .get(device)
            .copied()
            .ok_or_else(|| {
                CollectorError::unavailable(format!("no sector size for {}", device))
            })?;
        self.sector_sizes.insert(device.to_string(), size);
        Ok(size)
    }

    fn query_sector_sizes(&self, devices: &[&str]) -> Result<HashMap<String, u64>, CollectorError> {
        let lsblk = self.root.join("bin").join("lsblk");
        let mut args = vec!["-psdJ", "-oNAME,FSTYPE,LOG-SEC"];
        args.extend_from_slice(devices);
        let json = run_utility(&lsblk, &args, &[])?;
        parse_lsblk(&json)
    }

    fn read_disk_data(&self, device: &str, sector_size: u64) -> Result<RawDiskData, CollectorError> {
        let name = device.strip_prefix("/dev/").unwrap_or(device);
        let path = block_stat_path(&self.root, name);
        let content = fs::read_to_string(&path).map_err(|e| {
            CollectorError::unavailable(format!("no data for {}: {}: {}", device, path.display(), e))
        })?;
        parse_block_stat(device, &content, sector_size, Instant::now()).ok_or_else(|| {
            CollectorError::unavailable(format!("no data for {}: {} is empty", device, path.display()))
        })
    }
}

fn block_stat_path(root: &Path, name: &str) -> PathBuf {
    root.join("sys").join("class").join("block").join(name).join("stat")
}
