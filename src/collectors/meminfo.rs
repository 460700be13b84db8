//! Available/total memory from /proc/meminfo.

use std::fs;
use std::path::Path;

use crate::error::CollectorError;

/// Reads `proc/meminfo` under `root` and returns `(available_kb, total_kb)`.
///
/// I/O errors are returned unmodified; a missing field is `Unavailable`.
pub fn read_available_memory_kb(root: &Path) -> Result<(u64, u64), CollectorError> {
    let content = fs::read_to_string(root.join("proc").join("meminfo"))?;
    parse_meminfo(&content)
}

/// Parses `MemTotal:` and `MemAvailable:` lines expressed in kB.
pub fn parse_meminfo(content: &str) -> Result<(u64, u64), CollectorError> {
    let mut total: Option<u64> = None;
    let mut available: Option<u64> = None;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 || parts[2] != "kB" {
            continue;
        }
        let Ok(value) = parts[1].parse::<u64>() else {
            continue;
        };
        match parts[0] {
            "MemTotal:" => total = Some(value),
            "MemAvailable:" => available = Some(value),
            _ => {}
        }

        if total.is_some() && available.is_some() {
            break;
        }
    }

    let available =
        available.ok_or_else(|| CollectorError::unavailable("Available memory not found"))?;
    let total = total.ok_or_else(|| CollectorError::unavailable("Total memory not found"))?;

    Ok((available, total))
}
