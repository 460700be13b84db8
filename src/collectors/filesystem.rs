//! Filesystem usage collector.
//!
//! Sizes come from `df` with exact byte units, restricted to the ext2/3/4
//! family of filesystems.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;

use crate::collectors::utility::run_utility;
use crate::error::CollectorError;

static EXT_FSTYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ext[234]$").expect("valid regex"));

/// Usage of a single mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Filesystem {
    pub device: String,
    pub mount_point: String,
    pub size_bytes: u64,
    pub free_bytes: u64,
}

impl Filesystem {
    /// Builds a record, rejecting devices outside /dev/, relative mount
    /// points, non-decimal numbers and zero-sized filesystems.
    pub fn new(device: &str, mount_point: &str, size: &str, free: &str) -> Option<Self> {
        if !device.starts_with("/dev/") || !mount_point.starts_with('/') {
            return None;
        }
        let size_bytes = parse_decimal(size)?;
        if size_bytes == 0 {
            return None;
        }
        let free_bytes = parse_decimal(free)?;

        Some(Self {
            device: device.to_string(),
            mount_point: mount_point.to_string(),
            size_bytes,
            free_bytes,
        })
    }
}

fn parse_decimal(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Runs `bin/df` under `root` and parses its output.
pub fn read_filesystems(root: &Path) -> Result<Vec<Filesystem>, CollectorError> {
    let df = root.join("bin").join("df");
    let output = run_utility(
        &df,
        &["--block-size=1", "--output=fstype,source,target,size,avail"],
        &[],
    )?;
    Ok(parse_df(&output))
}

/// Parses `fstype source target size avail` lines; anything malformed is
/// dropped.
pub fn parse_df(output: &str) -> Vec<Filesystem> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 5 || !EXT_FSTYPE.is_match(parts[0]) {
                return None;
            }
            Filesystem::new(parts[1], parts[2], parts[3], parts[4])
        })
        .collect()
}
