//! Concurrency-safe key to bytes store backing the response cache

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::reaper;

/// Errors that can occur when constructing a cache
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The reap interval was zero or too large to schedule
    #[error("Invalid cache interval: must be non-zero and within the clock's range")]
    InvalidInterval,

    /// No tokio runtime is available to host the reaper
    #[error("Cache reaper requires a running tokio runtime")]
    NoRuntime,
}

/// A stored response body and the instant it was inserted
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) created_at: Instant,
    pub(crate) value: Arc<[u8]>,
}

/// State shared by every cache handle. The reaper only holds a weak reference.
#[derive(Debug)]
pub(crate) struct Shared {
    entries: RwLock<HashMap<String, CacheEntry>>,
    interval: Duration,
    cancel: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    // retain leaves the map valid even if a sweep panics, so poisoned guards are reused
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes every entry older than the interval under one exclusive lock.
    ///
    /// Returns `(evicted, remaining)`.
    pub(crate) fn sweep(&self) -> (usize, usize) {
        let mut entries = self.write();
        let evicted = reaper::evict_expired(&mut entries, Instant::now(), self.interval);
        (evicted, entries.len())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Time-expiring cache of raw response bodies keyed by request URL
///
/// Construction spawns a reaper task that wakes every `interval` and deletes entries
/// whose age exceeds `interval`. Staleness is therefore bounded by roughly twice the
/// interval. Cloning is cheap; all clones share one store and one reaper, and the
/// reaper is cancelled when the last clone is dropped or [`shutdown`](Self::shutdown)
/// is called.
///
/// Every sweep holds the exclusive lock for the full scan. That is fine for a single
/// interactive user but becomes a reader-starvation ceiling for very large stores.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    shared: Arc<Shared>,
}

impl ResponseCache {
    /// Creates an empty cache and starts its reaper on the current tokio runtime
    ///
    /// # Arguments
    /// * `interval` - Both the sweep period and the maximum age of an entry
    ///
    /// # Returns
    /// * `Ok(ResponseCache)` with the reaper running
    /// * `Err(CacheError::InvalidInterval)` if `interval` is zero or overflows the clock
    /// * `Err(CacheError::NoRuntime)` if called outside a tokio runtime
    pub fn new(interval: Duration) -> Result<Self, CacheError> {
        if interval.is_zero() {
            return Err(CacheError::InvalidInterval);
        }
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        let first_tick = Instant::now()
            .checked_add(interval)
            .ok_or(CacheError::InvalidInterval)?;

        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared {
            entries: RwLock::new(HashMap::new()),
            interval,
            cancel: cancel.clone(),
            reaper: Mutex::new(None),
        });

        let task = runtime.spawn(reaper::run(
            Arc::downgrade(&shared),
            first_tick,
            interval,
            cancel,
            Shared::sweep,
        ));
        *shared
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        Ok(Self { shared })
    }

    /// Inserts or replaces the entry for `key`, stamping it with the current instant
    pub fn add(&self, key: impl Into<String>, value: impl Into<Arc<[u8]>>) {
        let key = key.into();
        let value = value.into();
        let mut entries = self.shared.write();
        entries.insert(
            key,
            CacheEntry {
                created_at: Instant::now(),
                value,
            },
        );
    }

    /// Looks up `key` without touching its age
    ///
    /// Returns a shared handle to the stored bytes, or `None` on a miss.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        self.shared
            .read()
            .get(key)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// The sweep period, which is also the maximum entry age
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    pub fn len(&self) -> usize {
        self.shared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.read().is_empty()
    }

    /// Whether the reaper task is still alive
    pub fn is_reaper_running(&self) -> bool {
        self.shared
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops the reaper and waits for its task to finish
    ///
    /// Stored entries remain readable afterwards but are no longer evicted.
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let task = self
            .shared
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "cache reaper ended abnormally");
            }
        }
    }
}
