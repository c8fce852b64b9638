//! Periodic dispatch scheduler.
//!
//! Runs the dispatcher on a fixed cadence in a background thread and
//! supports manual "sync now" triggers via a broadcast channel. A second,
//! much slower timer applies the retention purge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::clickup::Transport;
use crate::sync::dispatcher::Dispatcher;

enum Wake {
    Sync,
    Purge,
}

/// Periodic queue drain with manual trigger support.
pub struct SyncScheduler<T> {
    dispatcher: Arc<Dispatcher<T>>,
    sync_interval: Duration,
    purge_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport + 'static> SyncScheduler<T> {
    /// Creates a new scheduler. Intervals usually come straight from the
    /// config (`sync_interval_secs`, `purge_interval_secs`).
    pub fn new(
        dispatcher: Arc<Dispatcher<T>>,
        sync_interval: Duration,
        purge_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            sync_interval,
            purge_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the dispatch loop in a background thread.
    /// Accepts a trigger receiver for manual sync requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let shutdown = Arc::clone(&self.shutdown);
        let sync_interval = self.sync_interval;
        let purge_interval = self.purge_interval;

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let mut sync_timer = tokio::time::interval(sync_interval);
                let mut purge_timer = tokio::time::interval(purge_interval);
                sync_timer.tick().await; // skip immediate first tick
                purge_timer.tick().await;

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    let wake = tokio::select! {
                        _ = sync_timer.tick() => Wake::Sync,
                        _ = purge_timer.tick() => Wake::Purge,
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual sync triggered");
                            Wake::Sync
                        },
                    };

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    match wake {
                        Wake::Sync => match dispatcher.run_cycle().await {
                            Ok(0) => {}
                            Ok(count) => log::info!("Dispatched {} job(s)", count),
                            Err(e) => log::error!("Dispatch cycle failed: {}", e),
                        },
                        Wake::Purge => match dispatcher.purge_expired() {
                            Ok((0, 0)) => {}
                            Ok((queue_rows, log_rows)) => log::info!(
                                "Retention purge removed {} queue row(s), {} log row(s)",
                                queue_rows,
                                log_rows
                            ),
                            Err(e) => log::error!("Retention purge failed: {}", e),
                        },
                    }
                }
            });
        })
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
