//! Background Commit Scheduler
//!
//! In async mode writes only reach the uncommitted writer state. This task
//! commits them every `commit_interval`, trading a bounded window of
//! possible loss for write throughput.
//!
//! The task holds only a weak reference to the index, so dropping the engine
//! releases the index immediately. Uncommitted writes are then lost, exactly
//! as if the process had died.

use super::core::IndexCore;
use crate::error::StoreError;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

/// A handle to the running commit task.
///
/// When this handle is dropped, the task is stopped.
#[derive(Debug)]
pub struct CommitScheduler {
    shutdown_tx: watch::Sender<bool>,
}

impl CommitScheduler {
    /// Starts committing `core` every `interval` on `runtime`.
    pub fn start(core: &Arc<IndexCore>, interval: Duration, runtime: &Handle) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        runtime.spawn(commit_loop(Arc::downgrade(core), interval, shutdown_rx));

        info!(
            interval_ms = interval.as_millis(),
            "Background commit task started"
        );

        Self { shutdown_tx }
    }

    /// Stops the task. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        debug!("Background commit task stopped");
    }
}

impl Drop for CommitScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn commit_loop(
    core: Weak<IndexCore>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Commit task received shutdown signal");
                    return;
                }
            }
        }

        let Some(core) = core.upgrade() else {
            debug!("Index dropped, commit task exiting");
            return;
        };

        if !core.has_pending() {
            trace!("Nothing to commit");
            continue;
        }

        // Commits block on disk I/O
        match tokio::task::spawn_blocking(move || core.commit()).await {
            Ok(Ok(flushed)) => debug!(flushed = flushed, "Background commit"),
            Ok(Err(StoreError::Closed)) => return,
            Ok(Err(err)) => error!(
                error = %err,
                "Background commit failed, uncommitted writes kept for the next attempt"
            ),
            Err(err) => error!(error = %err, "Background commit task panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexConfig;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_commits_periodically() {
        let core = Arc::new(IndexCore::open(&IndexConfig::in_memory(), false).unwrap());
        let _scheduler =
            CommitScheduler::start(&core, Duration::from_millis(20), &Handle::current());

        core.upsert("s", "k", Bytes::from("v"), None).unwrap();
        assert!(core.has_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!core.has_pending());
        assert!(core.commit_count() >= 1);
    }

    #[tokio::test]
    async fn test_stops_on_drop() {
        let core = Arc::new(IndexCore::open(&IndexConfig::in_memory(), false).unwrap());
        let scheduler =
            CommitScheduler::start(&core, Duration::from_millis(20), &Handle::current());
        drop(scheduler);

        core.upsert("s", "k", Bytes::from("v"), None).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(core.has_pending());
        assert_eq!(core.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_exits_when_index_dropped() {
        let core = Arc::new(IndexCore::open(&IndexConfig::in_memory(), false).unwrap());
        let weak = Arc::downgrade(&core);
        let _scheduler =
            CommitScheduler::start(&core, Duration::from_millis(10), &Handle::current());

        drop(core);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(weak.upgrade().is_none());
    }
}
