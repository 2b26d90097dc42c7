//! Trailing debounce: each call for a key restarts its quiet period, and
//! only the last scheduled action runs once the key has been quiet.

use crate::sharing::SharingStore;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

pub const DEFAULT_PERSIST_DELAY: Duration = Duration::from_millis(500);

struct Pending {
    seq: u64,
    timer: JoinHandle<()>,
    action: BoxFuture<'static, ()>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, Pending>>>;

/// Per-key trailing debouncer on tokio timers. At most one action is
/// pending per key.
pub struct Debouncer<K> {
    quiet: Duration,
    pending: PendingMap<K>,
    next_seq: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Replaces any pending action for `key` and restarts its quiet period.
    pub fn schedule<F>(&self, key: K, action: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let quiet = self.quiet;
        let timer_key = key.clone();

        let mut map = lock(&self.pending);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let due = {
                let mut map = lock(&pending);
                let current = map.get(&timer_key).map(|entry| entry.seq) == Some(seq);
                if current {
                    map.remove(&timer_key)
                } else {
                    None
                }
            };
            if let Some(due) = due {
                trace!("Debounced action for {:?} fired", timer_key);
                due.action.await;
            }
        });

        if let Some(previous) = map.insert(
            key,
            Pending {
                seq,
                timer,
                action: Box::pin(action),
            },
        ) {
            previous.timer.abort();
        }
    }

    /// Drops the pending action for `key`, if any.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some(previous) => {
                previous.timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Runs every pending action now, in no particular order. Returns how many ran.
    pub async fn flush(&self) -> usize {
        let drained: Vec<Pending> = lock(&self.pending).drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            entry.timer.abort();
            entry.action.await;
        }
        if count > 0 {
            debug!("Flushed {} debounced actions", count);
        }
        count
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, entry) in lock(&self.pending).drain() {
            entry.timer.abort();
        }
    }
}

fn lock<K>(pending: &Mutex<HashMap<K, Pending>>) -> MutexGuard<'_, HashMap<K, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coalesces rapid edits of one snippet into a single `persist` write.
pub struct PersistDebouncer {
    store: Arc<SharingStore>,
    debouncer: Debouncer<String>,
}

impl PersistDebouncer {
    pub fn new(store: Arc<SharingStore>, quiet: Duration) -> Self {
        Self {
            store,
            debouncer: Debouncer::new(quiet),
        }
    }

    pub fn with_default_delay(store: Arc<SharingStore>) -> Self {
        Self::new(store, DEFAULT_PERSIST_DELAY)
    }

    pub fn persist(&self, id: &str, code: &str, language_id: &str) {
        let store = Arc::clone(&self.store);
        let (key, code, language_id) = (id.to_string(), code.to_string(), language_id.to_string());
        let target = key.clone();
        self.debouncer.schedule(key, async move {
            store.persist(&target, &code, &language_id).await;
        });
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.debouncer.is_pending(&id.to_string())
    }

    pub async fn flush(&self) -> usize {
        self.debouncer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryMedium;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> BoxFuture<'static, ()>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let make = move |label: &'static str| -> BoxFuture<'static, ()> {
            let sink = Arc::clone(&sink);
            Box::pin(async move { sink.lock().unwrap().push(label) })
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_with_last_action() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let (fired, make) = recorder();

        debouncer.schedule("a", make("first"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        debouncer.schedule("a", make("second"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        debouncer.schedule("a", make("third"));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(debouncer.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["third"]);
        assert!(!debouncer.is_pending(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let (fired, make) = recorder();

        debouncer.schedule("a", make("a"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.schedule("b", make("b"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["a"]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_flush() {
        let debouncer = Debouncer::new(Duration::from_secs(10));
        let (fired, make) = recorder();

        debouncer.schedule(1, make("one"));
        debouncer.schedule(2, make("two"));
        assert!(debouncer.cancel(&1));
        assert!(!debouncer.cancel(&1));

        assert_eq!(debouncer.flush().await, 1);
        assert_eq!(*fired.lock().unwrap(), vec!["two"]);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_debouncer_writes_once() {
        let medium = Arc::new(MemoryMedium::new());
        let store = Arc::new(SharingStore::new(medium.clone(), ManualClock::new(0)));
        let debouncer = PersistDebouncer::with_default_delay(store.clone());

        for code in ["c", "co", "cod", "code"] {
            debouncer.persist("snippet", code, "javascript");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(debouncer.is_pending("snippet"));
        assert_eq!(medium.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(medium.write_count(), 1);
        assert_eq!(store.get_persisted("snippet").await.unwrap().code, "code");
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_debouncer_flush() {
        let medium = Arc::new(MemoryMedium::new());
        let store = Arc::new(SharingStore::new(medium.clone(), ManualClock::new(0)));
        let debouncer = PersistDebouncer::with_default_delay(store.clone());

        debouncer.persist("a", "x", "javascript");
        debouncer.persist("b", "y", "python");

        assert_eq!(debouncer.flush().await, 2);
        assert_eq!(medium.write_count(), 2);
        assert_eq!(store.get_persisted("b").await.unwrap().language_id, "python");
    }
}
