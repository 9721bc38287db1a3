//! Background poller driving the job processor on a fixed interval.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::processor::JobProcessor;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between two passes.
    pub interval: Duration,
    /// Name for logging
    pub name: String,
}

impl PollerConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            name: "processor-poller".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Poller runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PollerStats {
    pub ticks: u64,
    /// Passes that called the edge function.
    pub triggers: u64,
    /// Failed jobs put back in the queue.
    pub retried: u64,
    pub errors: u64,
    pub uptime_secs: u64,
}

/// Handle to control a running poller.
#[derive(Debug)]
pub struct ProcessorPollerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<PollerStats>>,
}

impl ProcessorPollerHandle {
    /// Stop the poller and wait for the current pass to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "processor poller task ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> PollerStats {
        lock(&self.stats).clone()
    }
}

/// Each pass runs check-and-process, then the retry pass.
pub struct ProcessorPoller;

impl ProcessorPoller {
    pub fn spawn(processor: Arc<JobProcessor>, config: PollerConfig) -> ProcessorPollerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(Mutex::new(PollerStats::default()));
        let join = tokio::spawn(poller_loop(processor, config, shutdown_rx, stats.clone()));

        ProcessorPollerHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
            stats,
        }
    }
}

fn lock(stats: &Mutex<PollerStats>) -> std::sync::MutexGuard<'_, PollerStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn poller_loop(
    processor: Arc<JobProcessor>,
    config: PollerConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
    stats: Arc<Mutex<PollerStats>>,
) {
    info!(poller = %config.name, interval_ms = config.interval.as_millis() as u64, "processor poller started");
    let start_time = Instant::now();
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
        }

        let check = processor.check_and_process().await;
        let retry = processor.retry_failed_jobs().await;

        let mut s = lock(&stats);
        s.ticks += 1;
        s.uptime_secs = start_time.elapsed().as_secs();
        match check {
            Ok(report) if report.triggered => s.triggers += 1,
            Ok(_) => {}
            Err(e) => {
                s.errors += 1;
                error!(poller = %config.name, error = %e, "check-and-process failed");
            }
        }
        match retry {
            Ok(report) => s.retried += report.retried_count,
            Err(e) => {
                s.errors += 1;
                error!(poller = %config.name, error = %e, "retry pass failed");
            }
        }
        debug!(poller = %config.name, ticks = s.ticks, "poll pass finished");
    }

    info!(poller = %config.name, "processor poller stopped");
}
