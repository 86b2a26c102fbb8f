//! Background Expiry Sweeper
//!
//! Lazy expiry only reclaims entries that are touched again. A cache entry for
//! a key that is never read again would otherwise stay in memory forever, so
//! this task periodically calls [`MemoryCache::cleanup_expired`].
//!
//! ## Adaptive Frequency
//!
//! If many entries are expiring, the sweeper runs more often. If few are, it
//! backs off to save CPU.

use super::memory::MemoryCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 1s)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 100ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 30s)
    pub max_interval: Duration,

    /// If this fraction of entries expired in one sweep, speed up
    pub speedup_threshold: f64,

    /// If this fraction of entries expired in one sweep, slow down
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(30),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task is stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts sweeping `cache` on the current tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use stashkv::cache::{ExpiryConfig, ExpirySweeper, MemoryCache};
    /// use std::sync::Arc;
    ///
    /// let cache = Arc::new(MemoryCache::<bytes::Bytes>::new());
    /// let sweeper = ExpirySweeper::start(Arc::clone(&cache), ExpiryConfig::default());
    ///
    /// // Dropping the handle stops the task
    /// drop(sweeper);
    /// ```
    pub fn start<V>(cache: Arc<MemoryCache<V>>, config: ExpiryConfig) -> Self
    where
        V: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(cache, config, shutdown_rx));

        info!("Cache expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        debug!("Cache expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop<V>(
    cache: Arc<MemoryCache<V>>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    V: Send + Sync + 'static,
{
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let entries_before = cache.len();
        let expired = cache.cleanup_expired();

        if entries_before > 0 {
            let expiry_rate = expired as f64 / entries_before as f64;

            if expiry_rate > config.speedup_threshold {
                current_interval = (current_interval / 2).max(config.min_interval);
                debug!(
                    expired = expired,
                    rate = %format!("{:.2}%", expiry_rate * 100.0),
                    new_interval_ms = current_interval.as_millis(),
                    "High expiry rate, speeding up sweeper"
                );
            } else if expiry_rate < config.slowdown_threshold && expired == 0 {
                current_interval = (current_interval * 2).min(config.max_interval);
                trace!(
                    new_interval_ms = current_interval.as_millis(),
                    "Low expiry rate, slowing down sweeper"
                );
            }
        }

        if expired > 0 {
            debug!(
                expired = expired,
                entries_remaining = cache.len(),
                "Expired cache entries cleaned up"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheProvider, CacheTtl};

    #[tokio::test]
    async fn test_sweeper_cleans_expired_entries() {
        let cache = Arc::new(MemoryCache::new());

        for i in 0..10 {
            cache.set(
                &format!("s:{}", i),
                i,
                CacheTtl::after_write(Duration::from_millis(50)),
            );
        }
        cache.set("s:persistent", 99, CacheTtl::NONE);
        assert_eq!(cache.len(), 11);

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            min_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(40),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&cache), config);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("s:persistent"), Some(99));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let cache = Arc::new(MemoryCache::new());

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&cache), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        cache.set("s:k", 1, CacheTtl::after_write(Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nothing swept it, so it is still counted until touched
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("s:k"), None);
        assert!(cache.is_empty());
    }
}
