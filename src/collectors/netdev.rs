//! Network interface byte counters.
//!
//! Counters come from /proc/net/dev, "up" interfaces are the ones holding a
//! route in /proc/net/route, and interfaces listed under
//! /sys/devices/virtual/net are ignored.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::counter::CounterModulus;
use crate::error::CollectorError;

/// Cumulative counters of one interface at one point in time.
#[derive(Debug, Clone)]
pub struct RawNetData {
    pub device: String,
    pub time: Instant,
    pub up: bool,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Traffic of one interface between two samples.
#[derive(Debug, Clone, PartialEq)]
pub struct NetData {
    pub device: String,
    pub delta_time: Duration,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl NetData {
    pub fn is_active(&self) -> bool {
        self.bytes_received > 0 || self.bytes_sent > 0
    }
}

impl RawNetData {
    /// Traffic since `previous`, corrected for one counter wrap.
    pub fn delta_since(&self, previous: &RawNetData, modulus: CounterModulus) -> NetData {
        NetData {
            device: self.device.clone(),
            delta_time: self.time.saturating_duration_since(previous.time),
            bytes_received: modulus.delta(previous.bytes_received, self.bytes_received),
            bytes_sent: modulus.delta(previous.bytes_sent, self.bytes_sent),
        }
    }

    fn idle(&self) -> NetData {
        NetData {
            device: self.device.clone(),
            delta_time: Duration::ZERO,
            bytes_received: 0,
            bytes_sent: 0,
        }
    }
}

/// Reads the current counters for every non-virtual interface under `root`.
pub fn read_net_data(root: &Path) -> Result<HashMap<String, RawNetData>, CollectorError> {
    let virtual_net = root.join("sys").join("devices").join("virtual").join("net");
    let devices_up = read_up_devices(root);
    let content = fs::read_to_string(root.join("proc").join("net").join("dev"))?;
    let now = Instant::now();

    let mut result = HashMap::new();
    for (device, bytes_received, bytes_sent) in parse_netdev(&content) {
        if virtual_net.join(&device).exists() {
            continue;
        }
        let up = devices_up.contains(&device);
        result.insert(
            device.clone(),
            RawNetData {
                device,
                time: now,
                up,
                bytes_received,
                bytes_sent,
            },
        );
    }

    Ok(result)
}

/// Parses /proc/net/dev into `(interface, received_bytes, sent_bytes)`.
///
/// The name is split off at the first ':' so rows where a large counter is
/// glued to the name still parse. Header lines have no ':' and are skipped.
pub fn parse_netdev(content: &str) -> Vec<(String, u64, u64)> {
    let mut stats = Vec::new();

    for line in content.lines() {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        let interface = name.trim();
        if interface.is_empty() || interface.contains(char::is_whitespace) {
            continue;
        }

        let values: Vec<&str> = counters.split_whitespace().collect();
        if values.len() < 9 {
            continue; // Skip malformed lines
        }

        let received = values[0].parse().unwrap_or(0);
        let sent = values[8].parse().unwrap_or(0);
        stats.push((interface.to_string(), received, sent));
    }

    stats
}

/// Interfaces with at least one route. A missing or unreadable route table
/// means no interface is considered up.
pub fn read_up_devices(root: &Path) -> HashSet<String> {
    let path = root.join("proc").join("net").join("route");
    match fs::read_to_string(&path) {
        Ok(content) => parse_routes(&content),
        Err(e) => {
            debug!("Failed to read {}: {}", path.display(), e);
            HashSet::new()
        }
    }
}

/// First field of every data line; the header line is skipped.
pub fn parse_routes(content: &str) -> HashSet<String> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Diffs `current` against `previous`.
///
/// An interface is reported when it is up or when its counters moved, so the
/// final traffic of an interface that just went down is not lost. A new
/// interface is reported with zero traffic only if it is up.
pub fn diff_net_data(
    previous: &HashMap<String, RawNetData>,
    current: &HashMap<String, RawNetData>,
    modulus: CounterModulus,
) -> Vec<NetData> {
    let mut result = Vec::new();
    for (device, now) in current {
        match previous.get(device) {
            None => {
                if now.up {
                    result.push(now.idle());
                }
            }
            Some(before) => {
                let diff = now.delta_since(before, modulus);
                if now.up || diff.is_active() {
                    result.push(diff);
                }
            }
        }
    }
    result.sort_by(|a, b| a.device.cmp(&b.device));
    result
}
