//! Lifecycle wrapper around the polling loop.
//!
//! `MetricsEngine::start` spawns exactly one background thread that baselines
//! the collector and then alternates between waiting for the poll interval and
//! running one cycle. The only state shared with that thread is a run flag
//! and a wake signal guarded by a single mutex; `stop` clears the flag and
//! wakes the thread so it exits without sleeping out the interval.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::collector::{DataCollector, PerfCollector};
use crate::config::{validate_settings, Settings};
use crate::error::EngineError;
use crate::metric::MetricTuple;
use crate::scheduler::{MetricsCallback, PollingLoop};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Everything one polling session needs.
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub computer: Option<String>,
    pub shutdown_grace: Duration,
    pub collector: Box<dyn PerfCollector>,
}

impl EngineConfig {
    pub fn new(collector: Box<dyn PerfCollector>) -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            computer: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            collector,
        }
    }

    /// Builds a config backed by a [`DataCollector`] rooted at
    /// `settings.root`.
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        validate_settings(settings).map_err(EngineError::InvalidConfig)?;
        Ok(Self {
            poll_interval: Duration::from_secs(settings.poll_interval_seconds),
            computer: settings.computer.clone(),
            shutdown_grace: Duration::from_secs(settings.shutdown_grace_seconds),
            collector: Box::new(DataCollector::new(settings.root.clone())),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_computer(mut self, computer: impl Into<String>) -> Self {
        self.computer = Some(computer.into());
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(EngineError::InvalidConfig(format!(
                "poll interval must be at least {} second, got {:?}",
                MIN_POLL_INTERVAL.as_secs(),
                self.poll_interval
            )));
        }
        Ok(())
    }
}

/// Run flag plus wake signal shared between the controller and the worker.
struct Shared {
    run: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            run: Mutex::new(true),
            wake: Condvar::new(),
        }
    }

    /// Sleeps up to `interval` unless stopped first. Returns whether the loop
    /// should still run.
    fn wait(&self, interval: Duration) -> bool {
        let mut run = self.run.lock();
        if *run {
            self.wake.wait_for(&mut run, interval);
        }
        *run
    }

    fn request_stop(&self) {
        let mut run = self.run.lock();
        *run = false;
        self.wake.notify_all();
    }
}

struct Worker {
    shared: Arc<Shared>,
    handle: JoinHandle<Box<dyn PerfCollector>>,
    shutdown_grace: Duration,
}

/// Starts and stops the background polling thread.
#[derive(Default)]
pub struct MetricsEngine {
    worker: Option<Worker>,
    collector: Option<Box<dyn PerfCollector>>,
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the polling thread. Fails with [`EngineError::AlreadyStarted`]
    /// unless the engine is stopped.
    pub fn start<F>(&mut self, config: EngineConfig, callback: F) -> Result<(), EngineError>
    where
        F: FnMut(Vec<MetricTuple>) -> anyhow::Result<()> + Send + 'static,
    {
        config.validate()?;
        if self.worker.is_some() {
            return Err(EngineError::AlreadyStarted);
        }

        let EngineConfig {
            poll_interval,
            computer,
            shutdown_grace,
            collector,
        } = config;
        let callback: MetricsCallback = Box::new(callback);
        let shared = Arc::new(Shared::new());
        let worker_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("perfmetrics-poller".to_string())
            .spawn(move || {
                let mut poller = PollingLoop::new(collector, computer, callback);
                run_polling_loop(&mut poller, &worker_shared, poll_interval);
                poller.into_collector()
            })
            .map_err(EngineError::Spawn)?;

        self.worker = Some(Worker {
            shared,
            handle,
            shutdown_grace,
        });
        Ok(())
    }

    /// Signals the polling thread to exit and waits up to the shutdown grace
    /// period for it. No-op when stopped.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.shared.request_stop();

        let deadline = Instant::now() + worker.shutdown_grace;
        while !worker.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL);
        }

        if !worker.handle.is_finished() {
            // The run flag is already cleared; the thread exits at its next
            // check point.
            warn!(
                "Polling thread did not stop within {:?}, detaching it",
                worker.shutdown_grace
            );
            return;
        }

        match worker.handle.join() {
            Ok(collector) => {
                debug!("Polling thread joined");
                self.collector = Some(collector);
            }
            Err(_) => error!("Polling thread panicked"),
        }
    }

    /// True while the polling thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Collector handed back by the last cleanly stopped session, with its
    /// cached samples intact.
    pub fn take_collector(&mut self) -> Option<Box<dyn PerfCollector>> {
        self.collector.take()
    }
}

impl Drop for MetricsEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_polling_loop(poller: &mut PollingLoop, shared: &Shared, interval: Duration) {
    if let Err(e) = poller.initialize() {
        error!("Unable to get MMA IDs. Terminating: {}", e);
        return;
    }

    info!(
        "Starting polling loop at {} second interval",
        interval.as_secs_f64()
    );
    while shared.wait(interval) {
        poller.run_cycle();
    }
    info!("Stopping polling");
}
