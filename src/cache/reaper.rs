//! Background eviction task for the response cache

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::store::CacheEntry;

/// Deletes every entry whose age strictly exceeds `max_age`
///
/// Returns the number of entries removed.
pub(crate) fn evict_expired(
    entries: &mut HashMap<String, CacheEntry>,
    now: Instant,
    max_age: Duration,
) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| now.saturating_duration_since(entry.created_at) <= max_age);
    before - entries.len()
}

/// Calls `sweep` on the store every `interval` until cancelled or the store is dropped
///
/// `sweep` returns `(evicted, remaining)`. A panic inside a sweep is logged and the
/// loop carries on with the next tick.
pub(crate) async fn run<T, F>(
    store: Weak<T>,
    first_tick: Instant,
    interval: Duration,
    cancel: CancellationToken,
    sweep: F,
) where
    F: Fn(&T) -> (usize, usize),
{
    let mut ticker = time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval_ms = interval.as_millis() as u64, "cache reaper started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(target) = store.upgrade() else {
                    break;
                };
                match panic::catch_unwind(AssertUnwindSafe(|| sweep(&*target))) {
                    Ok((evicted, remaining)) => {
                        debug!(evicted, remaining, "cache sweep finished");
                    }
                    Err(_) => {
                        error!("cache sweep panicked; retrying on next tick");
                    }
                }
            }
        }
    }

    debug!("cache reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Entries = Mutex<HashMap<String, CacheEntry>>;

    fn sweep_entries(entries: &Entries, max_age: Duration) -> (usize, usize) {
        let mut entries = entries.lock().unwrap();
        let evicted = evict_expired(&mut entries, Instant::now(), max_age);
        (evicted, entries.len())
    }

    fn entry(created_at: Instant) -> CacheEntry {
        CacheEntry {
            created_at,
            value: Arc::from(&b"body"[..]),
        }
    }

    #[test]
    fn test_evict_expired_removes_only_older_entries() {
        let base = Instant::now();
        let now = base + Duration::from_secs(301);
        let max_age = Duration::from_secs(300);
        let mut entries = HashMap::new();
        entries.insert("fresh".to_string(), entry(base + Duration::from_secs(291)));
        entries.insert("stale".to_string(), entry(base));

        let evicted = evict_expired(&mut entries, now, max_age);

        assert_eq!(evicted, 1);
        assert!(entries.contains_key("fresh"));
        assert!(!entries.contains_key("stale"));
    }

    #[test]
    fn test_evict_expired_keeps_entry_at_exact_max_age() {
        let base = Instant::now();
        let max_age = Duration::from_secs(300);
        let now = base + max_age;
        let mut entries = HashMap::new();
        entries.insert("boundary".to_string(), entry(base));

        assert_eq!(evict_expired(&mut entries, now, max_age), 0);
        assert!(entries.contains_key("boundary"));
    }

    #[test]
    fn test_evict_expired_on_empty_map() {
        let mut entries = HashMap::new();
        assert_eq!(
            evict_expired(&mut entries, Instant::now(), Duration::from_secs(1)),
            0
        );
    }

    #[test]
    fn test_evict_expired_tolerates_future_timestamps() {
        let now = Instant::now();
        let mut entries = HashMap::new();
        entries.insert("ahead".to_string(), entry(now + Duration::from_secs(5)));

        assert_eq!(evict_expired(&mut entries, now, Duration::from_secs(1)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_when_cancelled() {
        let cancel = CancellationToken::new();
        let interval = Duration::from_millis(100);
        let task = tokio::spawn(run(
            Weak::<Entries>::new(),
            Instant::now() + interval,
            interval,
            cancel.clone(),
            move |entries: &Entries| sweep_entries(entries, interval),
        ));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_when_store_is_gone() {
        let interval = Duration::from_millis(100);
        let task = tokio::spawn(run(
            Weak::<Entries>::new(),
            Instant::now() + interval,
            interval,
            CancellationToken::new(),
            move |entries: &Entries| sweep_entries(entries, interval),
        ));

        // First tick finds no store and ends the loop
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_panicking_sweep() {
        let interval = Duration::from_millis(100);
        let store: Arc<Entries> = Arc::new(Mutex::new(HashMap::new()));
        store
            .lock()
            .unwrap()
            .insert("a".to_string(), entry(Instant::now()));

        let calls = Arc::new(AtomicUsize::new(0));
        let sweep_calls = Arc::clone(&calls);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::downgrade(&store),
            Instant::now() + interval,
            interval,
            cancel.clone(),
            move |entries: &Entries| {
                if sweep_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first sweep fails");
                }
                sweep_entries(entries, interval)
            },
        ));

        // t=100ms sweep panics, t=200ms sweep evicts the 200ms-old entry
        time::sleep(Duration::from_millis(250)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.lock().unwrap().is_empty(), "Later sweep should still evict");
        assert!(!task.is_finished(), "Reaper must keep running after a panic");

        cancel.cancel();
        task.await.unwrap();
    }
}
