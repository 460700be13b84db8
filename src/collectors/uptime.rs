//! Cumulative uptime and idle seconds from /proc/uptime.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::CollectorError;

/// Absolute snapshot of `/proc/uptime`: seconds since boot and cumulative idle
/// seconds summed over all CPUs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuTimes {
    pub uptime: f64,
    pub idle: f64,
}

pub fn read_cpu_times(root: &Path) -> Result<CpuTimes, CollectorError> {
    let content = fs::read_to_string(root.join("proc").join("uptime"))?;
    parse_uptime(&content)
}

/// Format: "<uptime_seconds> <idle_seconds>"
pub fn parse_uptime(content: &str) -> Result<CpuTimes, CollectorError> {
    let first_line = content.lines().next().unwrap_or("");
    let mut fields = first_line.split_whitespace().map(|f| f.parse::<f64>());

    let uptime = match fields.next() {
        Some(Ok(v)) => v,
        _ => return Err(CollectorError::unavailable("Uptime not found")),
    };
    let idle = match fields.next() {
        Some(Ok(v)) => v,
        _ => return Err(CollectorError::unavailable("Idle time not found")),
    };

    Ok(CpuTimes { uptime, idle })
}
