//! VM Performance Metrics Library
//!
//! This library samples host performance data from procfs, sysfs and a few
//! system utilities and turns it into periodic batches of metric tuples.
//! Delivery is left to the caller through a callback, so the engine can be
//! embedded in any agent or pipeline.
//!
//! # Features
//!
//! - **Host Collector**: Memory, CPU, filesystem, network and block device data
//! - **Counter Wrap Handling**: 32/64-bit counter deltas chosen from the CPU word width
//! - **Polling Engine**: One background thread with prompt, bounded shutdown
//! - **Error Throttling**: Recurring collection errors are logged once per hour
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vm_perfmetrics::{DataCollector, EngineConfig, MetricsEngine};
//!
//! let config = EngineConfig::new(Box::new(DataCollector::default()))
//!     .with_poll_interval(Duration::from_secs(60))
//!     .with_computer("web-01");
//!
//! let mut engine = MetricsEngine::new();
//! engine
//!     .start(config, |batch| {
//!         for tuple in &batch {
//!             println!("{}/{} = {}", tuple.namespace, tuple.name, tuple.value);
//!         }
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! // ... later
//! engine.stop();
//! ```

pub mod collector;
pub mod collectors;
pub mod config;
pub mod counter;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metric;
pub mod scheduler;
pub mod throttle;

// Re-export main types for convenience
pub use collector::{DataCollector, PerfCollector};
pub use config::{load_settings, validate_settings, Settings};
pub use engine::{EngineConfig, MetricsEngine};
pub use error::{CollectorError, EngineError};
pub use logging::init_logging;
pub use metric::MetricTuple;
