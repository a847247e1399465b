//! Scheduled poll task
//!
//! One tokio task per coordinator. Each tick runs the cycle on the blocking
//! pool and waits for it before the next tick, so a node never runs two
//! scheduled cycles at once. Cancelling signals the task and aborts it;
//! no tick starts after `cancel` returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::errors::{HaError, HaResult};

#[derive(Debug)]
pub(crate) struct PollTask {
    period: Duration,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Spawn on the current tokio runtime. The first tick fires one
    /// `period` from now.
    pub(crate) fn spawn<F>(period: Duration, tick: F) -> HaResult<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| {
            HaError::scheduling("a poll period is configured but no tokio runtime is running")
        })?;

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let tick = Arc::new(tick);

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let tick = Arc::clone(&tick);
                        // a panicking cycle ends that tick, not the loop
                        let _ = tokio::task::spawn_blocking(move || tick()).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            period,
            shutdown,
            handle,
        })
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    pub(crate) fn cancel(self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}
