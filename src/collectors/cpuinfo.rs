//! CPU count and word width via lscpu.

use std::path::Path;
use tracing::debug;

use crate::collectors::utility::run_utility;
use crate::error::CollectorError;

/// Result of CPU discovery at baseline. A failed count is kept as the error
/// so it can be raised later by the getter instead of failing baseline.
#[derive(Debug)]
pub struct CpuInfo {
    pub count: Result<usize, CollectorError>,
    pub is_64_bit: bool,
}

/// Runs `usr/bin/lscpu` twice: `-p` for the count of logical CPUs and plain
/// mode under `LC_ALL=C` for the op-mode line. A failed or empty listing
/// yields a deferred count error; the word width defaults to 64-bit only when
/// the summary itself cannot be obtained.
pub fn read_cpu_info(root: &Path) -> CpuInfo {
    let lscpu = root.join("usr").join("bin").join("lscpu");
    let count = run_utility(&lscpu, &["-p"], &[]).and_then(|listing| match count_cpus(&listing) {
        0 => Err(CollectorError::unavailable("No CPUs found")),
        n => Ok(n),
    });
    let is_64_bit = match run_utility(&lscpu, &[], &[("LC_ALL", "C")]) {
        Ok(summary) => is_64_bit_capable(&summary),
        Err(e) => {
            debug!("Assuming 64-bit counters: {}", e);
            true
        }
    };

    CpuInfo { count, is_64_bit }
}

/// Counts data lines (leading digit) in `lscpu -p` output.
pub fn count_cpus(listing: &str) -> usize {
    listing
        .lines()
        .filter(|line| line.as_bytes().first().is_some_and(u8::is_ascii_digit))
        .count()
}

/// True when the `CPU op-mode(s):` line lists 64-bit.
pub fn is_64_bit_capable(summary: &str) -> bool {
    summary
        .lines()
        .find(|line| line.starts_with("CPU op-mode(s):"))
        .is_some_and(|line| line.contains("64-bit"))
}
