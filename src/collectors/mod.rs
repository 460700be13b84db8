//! Collectors module for host performance counters.
//!
//! Each collector reads one pseudo-file family or invokes one external
//! utility, always relative to a configurable root directory so tests can
//! point them at a mock filesystem.

pub mod cpuinfo;
pub mod diskstats;
pub mod filesystem;
pub mod identity;
pub mod meminfo;
pub mod netdev;
pub mod uptime;
pub mod utility;
