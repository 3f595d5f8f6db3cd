//! Background driver for drain passes.
//!
//! One task owns three triggers:
//! - the sync interval, which runs a timer pass when background sync is
//!   enabled
//! - the cache sweep interval, which drops expired cache entries
//! - connectivity transitions, which run a pass on reconnect and cancel the
//!   pass in flight on disconnect
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tipsync_core::{ConnectivityMonitor, SyncOrchestrator};
//! use tipsync_domain::Config;
//! use tipsync_infra::scheduling::{SyncScheduler, SyncSchedulerConfig};
//! use tipsync_infra::sync::WatchConnectivity;
//!
//! # async fn example(orchestrator: Arc<SyncOrchestrator>) -> Result<(), Box<dyn std::error::Error>> {
//! let connectivity = WatchConnectivity::default();
//! let mut scheduler = SyncScheduler::new(
//!     orchestrator,
//!     connectivity.subscribe(),
//!     SyncSchedulerConfig::from_config(&Config::default()),
//! );
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tipsync_common::testing::Clock;
use tipsync_core::{SyncOrchestrator, SyncTrigger};
use tipsync_domain::Config;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the sync scheduler
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Period of timer-driven drain passes
    pub interval: Duration,
    /// Period of cache expiry sweeps
    pub sweep_interval: Duration,
}

impl SyncSchedulerConfig {
    /// Periods from the `sync` and `cache` sections, at least one second each.
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.sync.interval_seconds.max(1)),
            sweep_interval: Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
        }
    }
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A drain pass running on its own task.
struct InFlightPass {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl InFlightPass {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// What a new trigger does with the previous pass.
enum NextPass {
    /// The previous pass is still draining; keep it.
    Skip(InFlightPass),
    /// Start a pass, first waiting for a cancelled one to unwind.
    Start { after: Option<JoinHandle<()>> },
}

fn next_pass(in_flight: Option<InFlightPass>) -> NextPass {
    match in_flight {
        Some(pass) if pass.is_running() && !pass.cancel.is_cancelled() => NextPass::Skip(pass),
        Some(pass) if pass.is_running() => NextPass::Start { after: Some(pass.handle) },
        _ => NextPass::Start { after: None },
    }
}

/// Sync scheduler for periodic and reconnect-triggered drain passes
pub struct SyncScheduler<C: Clock + Clone> {
    orchestrator: Arc<SyncOrchestrator<C>>,
    connectivity: watch::Receiver<bool>,
    config: SyncSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl<C: Clock + Clone> SyncScheduler<C> {
    /// Scheduler driving `orchestrator`; call [`start`](Self::start) to run it.
    pub fn new(
        orchestrator: Arc<SyncOrchestrator<C>>,
        connectivity: watch::Receiver<bool>,
        config: SyncSchedulerConfig,
    ) -> Self {
        Self {
            orchestrator,
            connectivity,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the scheduler
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            sweep_secs = self.config.sweep_interval.as_secs(),
            "Starting sync scheduler"
        );

        // Fresh token so the scheduler can be restarted after stop
        self.cancellation_token = CancellationToken::new();

        let orchestrator = Arc::clone(&self.orchestrator);
        let connectivity = self.connectivity.clone();
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::run_loop(orchestrator, connectivity, config, cancel).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!("Sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// Cancels the background task, including any pass in flight, and awaits
    /// completion.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running or the task does not finish
    /// in time
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping sync scheduler");
        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            tokio::time::timeout(STOP_TIMEOUT, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: STOP_TIMEOUT.as_secs() })??;
        }

        info!("Sync scheduler stopped");
        Ok(())
    }

    /// Check if scheduler is running
    ///
    /// A scheduler is considered running if it has an active task handle that
    /// hasn't finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn run_loop(
        orchestrator: Arc<SyncOrchestrator<C>>,
        mut connectivity: watch::Receiver<bool>,
        config: SyncSchedulerConfig,
        cancel: CancellationToken,
    ) {
        let mut sync_tick = interval_at(Instant::now() + config.interval, config.interval);
        sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep_tick =
            interval_at(Instant::now() + config.sweep_interval, config.sweep_interval);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut online = *connectivity.borrow_and_update();
        let mut watching = true;
        let mut in_flight: Option<InFlightPass> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sync loop cancelled");
                    break;
                }
                _ = sync_tick.tick() => {
                    Self::sweep_cache(&orchestrator);
                    if orchestrator.is_background_sync_enabled() {
                        Self::spawn_pass(&orchestrator, SyncTrigger::Timer, &cancel, &mut in_flight);
                    } else {
                        debug!("Background sync disabled, skipping timer pass");
                    }
                }
                _ = sweep_tick.tick() => {
                    Self::sweep_cache(&orchestrator);
                }
                changed = connectivity.changed(), if watching => {
                    if changed.is_err() {
                        warn!("Connectivity source closed, relying on timer passes");
                        watching = false;
                        continue;
                    }
                    let now_online = *connectivity.borrow_and_update();
                    if now_online == online {
                        continue;
                    }
                    online = now_online;
                    orchestrator.connectivity_changed(online);

                    if online {
                        Self::spawn_pass(
                            &orchestrator,
                            SyncTrigger::ConnectivityRestored,
                            &cancel,
                            &mut in_flight,
                        );
                    } else if let Some(pass) = in_flight.as_ref().filter(|pass| pass.is_running()) {
                        info!("Connectivity lost, cancelling drain pass");
                        pass.cancel.cancel();
                    }
                }
            }
        }

        if let Some(pass) = in_flight.take() {
            pass.cancel.cancel();
            if let Err(err) = pass.handle.await {
                error!(error = %err, "Drain pass task failed during shutdown");
            }
        }
    }

    fn spawn_pass(
        orchestrator: &Arc<SyncOrchestrator<C>>,
        trigger: SyncTrigger,
        parent: &CancellationToken,
        in_flight: &mut Option<InFlightPass>,
    ) {
        let previous = match next_pass(in_flight.take()) {
            NextPass::Skip(pass) => {
                debug!(%trigger, "Drain pass still running, not starting another");
                *in_flight = Some(pass);
                return;
            }
            NextPass::Start { after } => after,
        };

        let cancel = parent.child_token();
        let pass_cancel = cancel.clone();
        let orchestrator = Arc::clone(orchestrator);

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                debug!(%trigger, "Waiting for cancelled drain pass to unwind");
                if let Err(err) = previous.await {
                    error!(error = %err, "Cancelled drain pass task failed");
                }
            }
            match orchestrator.run_pass(trigger, &pass_cancel).await {
                Ok(report) if report.is_skipped() => {
                    debug!(%trigger, reason = ?report.skipped, "Drain pass skipped");
                }
                Ok(report) => {
                    info!(
                        %trigger,
                        completed = report.completed,
                        retrying = report.retrying,
                        failed = report.failed,
                        cancelled = report.cancelled,
                        "Drain pass finished"
                    );
                }
                Err(err) => error!(%trigger, error = %err, "Drain pass failed"),
            }
        });

        *in_flight = Some(InFlightPass { cancel, handle });
    }

    fn sweep_cache(orchestrator: &SyncOrchestrator<C>) {
        let removed = orchestrator.cache().clear_expired();
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
    }
}

impl<C: Clock + Clone> Drop for SyncScheduler<C> {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(handle: JoinHandle<()>) -> InFlightPass {
        InFlightPass { cancel: CancellationToken::new(), handle }
    }

    #[tokio::test]
    async fn running_pass_blocks_new_trigger() {
        let running = pass(tokio::spawn(std::future::pending::<()>()));

        match next_pass(Some(running)) {
            NextPass::Skip(kept) => kept.handle.abort(),
            NextPass::Start { .. } => panic!("a live pass must not be doubled"),
        }
    }

    #[tokio::test]
    async fn cancelled_pass_still_unwinding_queues_reconnect() {
        let unwinding = pass(tokio::spawn(std::future::pending::<()>()));
        unwinding.cancel.cancel();

        match next_pass(Some(unwinding)) {
            NextPass::Start { after: Some(previous) } => previous.abort(),
            _ => panic!("reconnect must wait for the cancelled pass instead of being dropped"),
        }
    }

    #[tokio::test]
    async fn finished_pass_starts_immediately() {
        let handle = tokio::spawn(async {});
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(next_pass(Some(pass(handle))), NextPass::Start { after: None }));
        assert!(matches!(next_pass(None), NextPass::Start { after: None }));
    }
}
