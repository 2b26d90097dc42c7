use crate::clock::Clock;
use crate::error::Result;
use crate::medium::StorageMedium;
use crate::namespace::{
    duration_ms, is_expired, load_persisted, load_shared, partition_expired, save_shared, Namespace,
    TtlPolicy, PERSISTED_PREFIX, SHARED_KEY,
};
use crate::sharing::SharingStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_STORAGE_CEILING: usize = 5 * 1024 * 1024;
pub const DEFAULT_AUTO_CLEANUP_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorOptions {
    /// Assumed medium capacity for `estimate_usage`.
    pub storage_ceiling_bytes: usize,
}

impl Default for JanitorOptions {
    fn default() -> Self {
        Self {
            storage_ceiling_bytes: DEFAULT_STORAGE_CEILING,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub count_by_namespace: BTreeMap<Namespace, usize>,
    pub expired_count: usize,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub namespace: Namespace,
    pub id: String,
    pub language_id: String,
    pub timestamp: i64,
    pub size_bytes: usize,
    pub expired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEstimate {
    pub used_bytes: usize,
    pub percentage: f64,
    pub available_bytes: usize,
}

/// Statistics, sweeps and bulk clears over the sharing store's medium.
///
/// Every operation logs storage failures and degrades to an empty result.
pub struct Janitor {
    medium: Arc<dyn StorageMedium>,
    clock: Arc<dyn Clock>,
    policy: TtlPolicy,
    aggregate_lock: Arc<Mutex<()>>,
    options: JanitorOptions,
}

impl Janitor {
    /// Janitor over the same medium, clock, TTLs and aggregate lock as `store`.
    pub fn new(store: &SharingStore, options: JanitorOptions) -> Self {
        Self {
            medium: Arc::clone(store.medium()),
            clock: Arc::clone(store.clock()),
            policy: store.policy(),
            aggregate_lock: Arc::clone(store.aggregate_lock()),
            options,
        }
    }

    pub fn options(&self) -> JanitorOptions {
        self.options
    }

    pub async fn get_stats(&self) -> StorageStats {
        self.try_get_stats().await.unwrap_or_else(|e| {
            warn!("Failed to collect storage stats: {}", e);
            StorageStats::default()
        })
    }

    async fn try_get_stats(&self) -> Result<StorageStats> {
        let entries = self.try_get_all_entries().await?;
        let mut stats = StorageStats::default();
        for namespace in Namespace::ALL {
            stats.count_by_namespace.insert(namespace, 0);
        }

        for entry in &entries {
            stats.total_entries += 1;
            stats.total_size_bytes += entry.size_bytes;
            *stats.count_by_namespace.entry(entry.namespace).or_insert(0) += 1;
            if entry.expired {
                stats.expired_count += 1;
            }
            stats.oldest_entry = Some(stats.oldest_entry.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
            stats.newest_entry = Some(stats.newest_entry.map_or(entry.timestamp, |t| t.max(entry.timestamp)));
        }

        Ok(stats)
    }

    /// Every decodable entry in both namespaces, newest first.
    pub async fn get_all_entries(&self) -> Vec<EntryInfo> {
        self.try_get_all_entries().await.unwrap_or_else(|e| {
            warn!("Failed to list stored entries: {}", e);
            Vec::new()
        })
    }

    async fn try_get_all_entries(&self) -> Result<Vec<EntryInfo>> {
        let now = self.clock.now_ms();
        let mut entries = Vec::new();

        for record in load_shared(self.medium.as_ref()).await? {
            if let Some(entry) = record.entry {
                entries.push(EntryInfo {
                    namespace: Namespace::Shared,
                    expired: is_expired(entry.created_at, self.policy.ttl_ms(Namespace::Shared), now),
                    id: record.id,
                    language_id: entry.language_id,
                    timestamp: entry.created_at,
                    size_bytes: record.size_bytes,
                });
            }
        }

        for record in load_persisted(self.medium.as_ref()).await? {
            if let Some(entry) = record.entry {
                entries.push(EntryInfo {
                    namespace: Namespace::Persisted,
                    expired: is_expired(entry.saved_at, self.policy.ttl_ms(Namespace::Persisted), now),
                    id: record.id,
                    language_id: entry.language_id,
                    timestamp: entry.saved_at,
                    size_bytes: record.size_bytes,
                });
            }
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Removes entries past their namespace's TTL, plus anything corrupt.
    pub async fn cleanup_expired(&self) -> usize {
        let policy = self.policy;
        let removed = self.sweep(|namespace| policy.ttl_ms(namespace)).await;
        info!("Expired-entry cleanup removed {} entries", removed);
        removed
    }

    /// Removes entries older than `max_age` whatever their namespace.
    pub async fn cleanup_older_than(&self, max_age: Duration) -> usize {
        let max_age_ms = duration_ms(max_age);
        let removed = self.sweep(|_| max_age_ms).await;
        info!("Age cleanup ({}s) removed {} entries", max_age.as_secs(), removed);
        removed
    }

    async fn sweep(&self, max_age_ms: impl Fn(Namespace) -> i64) -> usize {
        let mut removed = 0;

        match self.sweep_shared(max_age_ms(Namespace::Shared)).await {
            Ok(count) => removed += count,
            Err(e) => warn!("Shared-entry sweep skipped: {}", e),
        }
        match self.sweep_persisted(max_age_ms(Namespace::Persisted)).await {
            Ok(count) => removed += count,
            Err(e) => warn!("Persisted-entry sweep skipped: {}", e),
        }

        removed
    }

    async fn sweep_shared(&self, max_age_ms: i64) -> Result<usize> {
        let _guard = self.aggregate_lock.lock().await;
        let now = self.clock.now_ms();

        let records = load_shared(self.medium.as_ref()).await?;
        let sweep = partition_expired(records.into_iter().map(|r| r.into_pair()), max_age_ms, now);
        if sweep.expired.is_empty() {
            return Ok(0);
        }

        save_shared(self.medium.as_ref(), sweep.kept.iter().map(|(_, entry)| entry)).await?;
        debug!("Removed shared entries {:?}", sweep.expired);
        Ok(sweep.expired.len())
    }

    async fn sweep_persisted(&self, max_age_ms: i64) -> Result<usize> {
        let now = self.clock.now_ms();
        let records = load_persisted(self.medium.as_ref()).await?;
        let sweep = partition_expired(records.into_iter().map(|r| r.into_keyed()), max_age_ms, now);

        let mut removed = 0;
        for key in &sweep.expired {
            match self.medium.delete(key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    "Could not delete persisted entry {}: {}",
                    String::from_utf8_lossy(key),
                    e
                ),
            }
        }
        Ok(removed)
    }

    /// Deletes the aggregate record and every persisted edit.
    pub async fn clear_all(&self) -> usize {
        match self.try_clear_all().await {
            Ok(removed) => {
                info!("Cleared {} stored entries", removed);
                removed
            }
            Err(e) => {
                warn!("Failed to clear storage: {}", e);
                0
            }
        }
    }

    async fn try_clear_all(&self) -> Result<usize> {
        let _guard = self.aggregate_lock.lock().await;
        let mut removed = load_shared(self.medium.as_ref()).await?.len();
        self.medium.delete(SHARED_KEY.as_bytes()).await?;

        for key in self.medium.get_by_prefix(PERSISTED_PREFIX.as_bytes()).await? {
            self.medium.delete(&key).await?;
            removed += 1;
        }

        Ok(removed)
    }

    /// Raw bytes held by both namespaces against the configured ceiling.
    /// Advisory only; writes are never refused because of it.
    pub async fn estimate_usage(&self) -> UsageEstimate {
        let used_bytes = match self.try_used_bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to estimate storage usage: {}", e);
                0
            }
        };

        let ceiling = self.options.storage_ceiling_bytes;
        let percentage = if ceiling == 0 {
            100.0
        } else {
            used_bytes as f64 / ceiling as f64 * 100.0
        };

        UsageEstimate {
            used_bytes,
            percentage,
            available_bytes: ceiling.saturating_sub(used_bytes),
        }
    }

    async fn try_used_bytes(&self) -> Result<usize> {
        let shared = self
            .medium
            .get(SHARED_KEY.as_bytes())
            .await?
            .map_or(0, |value| SHARED_KEY.len() + value.len());
        let persisted: usize = self
            .medium
            .scan_prefix(PERSISTED_PREFIX.as_bytes())
            .await?
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum();
        Ok(shared + persisted)
    }

    /// Runs one expiry sweep after `delay` on a background task.
    pub fn auto_cleanup(self: &Arc<Self>, delay: Duration) -> JoinHandle<usize> {
        let janitor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Starting deferred storage cleanup");
            janitor.cleanup_expired().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entry::NewSharedCode;
    use crate::memory::MemoryMedium;

    struct Fixture {
        store: SharingStore,
        janitor: Arc<Janitor>,
        medium: Arc<MemoryMedium>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let medium = Arc::new(MemoryMedium::new());
        let clock = ManualClock::new(1_700_000_000_000);
        let store = SharingStore::new(medium.clone(), clock.clone());
        let janitor = Arc::new(Janitor::new(&store, JanitorOptions::default()));
        Fixture {
            store,
            janitor,
            medium,
            clock,
        }
    }

    #[tokio::test]
    async fn test_stats_cover_both_namespaces() {
        let f = fixture();
        let id = f.store.put(NewSharedCode::new("javascript", "a")).await.unwrap();
        f.clock.advance(Duration::from_secs(60));
        f.store.persist(&id, "b", "javascript").await;
        f.medium.put(b"codepad:persisted:junk", b"{oops").await.unwrap();

        let stats = f.janitor.get_stats().await;

        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.count_by_namespace[&Namespace::Shared], 1);
        assert_eq!(stats.count_by_namespace[&Namespace::Persisted], 1);
        assert_eq!(stats.expired_count, 0);
        assert_eq!(stats.oldest_entry, Some(1_700_000_000_000));
        assert_eq!(stats.newest_entry, Some(1_700_000_060_000));
        assert!(stats.total_size_bytes > 0);
    }

    #[tokio::test]
    async fn test_entries_are_newest_first() {
        let f = fixture();
        let first = f.store.put(NewSharedCode::new("javascript", "a")).await.unwrap();
        f.clock.advance(Duration::from_secs(1));
        let second = f.store.put(NewSharedCode::new("python", "b")).await.unwrap();

        let entries = f.janitor.get_all_entries().await;

        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert_eq!(entries[0].language_id, "python");
    }

    #[tokio::test]
    async fn test_cleanup_expired_is_idempotent() {
        let f = fixture();
        f.store.put(NewSharedCode::new("javascript", "old")).await.unwrap();
        f.store.persist("edit", "x", "javascript").await;
        f.medium.put(b"codepad:persisted:junk", b"nope").await.unwrap();

        f.clock.advance(Duration::from_secs(31 * 60));
        f.store.persist("fresh", "y", "javascript").await;

        assert_eq!(f.janitor.get_stats().await.expired_count, 1);
        assert_eq!(f.janitor.cleanup_expired().await, 2);
        assert_eq!(f.janitor.cleanup_expired().await, 0);

        let stats = f.janitor.get_stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.count_by_namespace[&Namespace::Shared], 0);
        assert!(!f.medium.exists(SHARED_KEY.as_bytes()).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_removes_non_utf8_persisted_keys() {
        let f = fixture();
        f.medium.put(b"codepad:persisted:\xff", b"garbage").await.unwrap();
        f.medium
            .put(b"codepad:persisted:\xfe\xfd", br#"{"code":"x","languageId":"python","savedAt":0}"#)
            .await
            .unwrap();

        assert_eq!(f.janitor.cleanup_expired().await, 2);
        assert_eq!(f.janitor.cleanup_expired().await, 0);
        assert!(!f.medium.exists(b"codepad:persisted:\xff").await.unwrap());
        assert!(!f.medium.exists(b"codepad:persisted:\xfe\xfd").await.unwrap());
        assert_eq!(f.janitor.get_stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn test_cleanup_older_than_ignores_ttl_class() {
        let f = fixture();
        f.store.persist("a", "x", "javascript").await;
        f.clock.advance(Duration::from_secs(2 * 60 * 60));
        f.store.persist("b", "y", "javascript").await;

        assert_eq!(f.janitor.cleanup_older_than(Duration::from_secs(60 * 60)).await, 1);
        assert!(f.store.get_persisted("b").await.is_some());
        assert_eq!(f.janitor.cleanup_older_than(DEFAULT_MAX_AGE).await, 0);
    }

    #[tokio::test]
    async fn test_clear_all_empties_both_namespaces() {
        let f = fixture();
        let id = f.store.put(NewSharedCode::new("javascript", "a")).await.unwrap();
        f.store.put(NewSharedCode::new("javascript", "b")).await.unwrap();
        f.store.persist(&id, "c", "javascript").await;

        assert_eq!(f.janitor.clear_all().await, 3);

        let stats = f.janitor.get_stats().await;
        assert_eq!(stats.total_entries, 0);
        assert!(stats.count_by_namespace.values().all(|count| *count == 0));
        assert!(f.medium.is_empty().await);
    }

    #[tokio::test]
    async fn test_estimate_usage_against_ceiling() {
        let medium = Arc::new(MemoryMedium::new());
        let store = SharingStore::new(medium.clone(), ManualClock::new(0));
        let janitor = Janitor::new(&store, JanitorOptions { storage_ceiling_bytes: 100 });

        medium.put(b"codepad:persisted:a", &[b'x'; 31]).await.unwrap();
        medium.put(b"unrelated", &[b'x'; 500]).await.unwrap();

        let usage = janitor.estimate_usage().await;
        assert_eq!(usage.used_bytes, 50);
        assert_eq!(usage.available_bytes, 50);
        assert!((usage.percentage - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unavailable_medium_degrades() {
        let f = fixture();
        f.medium.set_available(false);

        assert_eq!(f.janitor.get_stats().await, StorageStats::default());
        assert!(f.janitor.get_all_entries().await.is_empty());
        assert_eq!(f.janitor.cleanup_expired().await, 0);
        assert_eq!(f.janitor.clear_all().await, 0);
        assert_eq!(f.janitor.estimate_usage().await.used_bytes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_cleanup_is_deferred() {
        let f = fixture();
        f.store.persist("old", "x", "javascript").await;
        f.clock.advance(Duration::from_secs(25 * 60 * 60));

        let handle = f.janitor.auto_cleanup(DEFAULT_AUTO_CLEANUP_DELAY);
        tokio::task::yield_now().await;
        assert!(f.medium.exists(b"codepad:persisted:old").await.unwrap());

        assert_eq!(handle.await.unwrap(), 1);
        assert!(!f.medium.exists(b"codepad:persisted:old").await.unwrap());
    }
}
