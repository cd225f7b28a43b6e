//! Periodic memory reclamation.
//!
//! Validating tons of short-lived documents churns the C allocator; without a
//! periodic trim the resident size of a long-running service keeps creeping
//! up. The ticker runs on its own thread with a single-threaded Tokio runtime,
//! so it works the same whether the engine is driven from async or blocking
//! code.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::error::{Result, XsdError};
use crate::libxml2::NativeRuntime;

/// Handle to a running reclamation ticker.
///
/// Stopping (explicitly or on drop) waits for the ticker thread to exit, so
/// once it returns no further tick can run.
#[derive(Debug)]
pub(crate) struct Reclaimer {
    interval: Duration,
    cancel: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Spawn the ticker. Every tick trims native memory and bumps `ticks`.
    pub(crate) fn start(
        every: Duration,
        runtime: Arc<dyn NativeRuntime>,
        ticks: Arc<AtomicU64>,
    ) -> Result<Self> {
        let (cancel, cancelled) = oneshot::channel::<()>();

        let worker = thread::Builder::new()
            .name("xsd-reclaim".to_string())
            .spawn(move || run_ticker(every, runtime, ticks, cancelled))
            .map_err(|e| XsdError::NativeEngine(format!("failed to spawn reclaim ticker: {}", e)))?;

        info!(interval_ms = every.as_millis() as u64, "reclaim ticker started");

        Ok(Self {
            interval: every,
            cancel: Some(cancel),
            worker: Some(worker),
        })
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal the ticker and wait for an in-flight tick to finish.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // The worker may already be gone if its runtime failed to build
            let _ = cancel.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("reclaim ticker panicked");
            }
            info!("reclaim ticker stopped");
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_ticker(
    every: Duration,
    runtime: Arc<dyn NativeRuntime>,
    ticks: Arc<AtomicU64>,
    mut cancelled: oneshot::Receiver<()>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!(error = %e, "reclaim ticker runtime could not be built");
            return;
        }
    };

    rt.block_on(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = &mut cancelled => break,
                _ = ticker.tick() => {
                    runtime.trim();
                    let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(tick, "reclaim tick");
                }
            }
        }
    });
}
