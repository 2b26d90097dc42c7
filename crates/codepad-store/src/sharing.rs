//! Moves snippets between features through short opaque ids.
//!
//! Every storage failure is logged and degraded: writes become no-ops and
//! reads come back empty, so a broken medium only disables sharing.

use crate::clock::Clock;
use crate::entry::{NewSharedCode, PersistedCode, PersistedCodeEntry, SharedCodeEntry};
use crate::error::Result;
use crate::id::generate_id;
use crate::medium::StorageMedium;
use crate::namespace::{
    decode_persisted, is_expired, load_shared, partition_expired, persisted_key, save_shared, Namespace, TtlPolicy,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where a restored snippet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetOrigin {
    Persisted,
    Shared,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredSnippet {
    pub code: String,
    pub language_id: String,
    pub origin: SnippetOrigin,
}

/// What to show when neither a persisted edit nor a shared entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fallback<'a> {
    pub language_id: &'a str,
    pub default_snippet: &'a str,
}

impl Fallback<'_> {
    fn restored(&self) -> RestoredSnippet {
        RestoredSnippet {
            code: self.default_snippet.to_string(),
            language_id: self.language_id.to_string(),
            origin: SnippetOrigin::Default,
        }
    }
}

#[derive(Clone)]
pub struct SharingStore {
    medium: Arc<dyn StorageMedium>,
    clock: Arc<dyn Clock>,
    policy: TtlPolicy,
    aggregate_lock: Arc<Mutex<()>>,
}

impl SharingStore {
    pub fn new(medium: Arc<dyn StorageMedium>, clock: Arc<dyn Clock>) -> Self {
        Self {
            medium,
            clock,
            policy: TtlPolicy::default(),
            aggregate_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_policy(mut self, policy: TtlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn medium(&self) -> &Arc<dyn StorageMedium> {
        &self.medium
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    /// Serializes read-modify-write cycles on the aggregate record.
    pub(crate) fn aggregate_lock(&self) -> &Arc<Mutex<()>> {
        &self.aggregate_lock
    }

    /// Stores a new shared snippet and returns its id, or `None` if the write
    /// failed. Expired entries are swept from the aggregate on the way.
    pub async fn put(&self, entry: NewSharedCode) -> Option<String> {
        match self.try_put(entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to share snippet on {}: {}", self.medium.name(), e);
                None
            }
        }
    }

    async fn try_put(&self, entry: NewSharedCode) -> Result<String> {
        let _guard = self.aggregate_lock.lock().await;
        let now = self.clock.now_ms();

        let records = load_shared(self.medium.as_ref()).await?;
        let sweep = partition_expired(
            records.into_iter().map(|r| r.into_pair()),
            self.policy.ttl_ms(Namespace::Shared),
            now,
        );
        if !sweep.expired.is_empty() {
            debug!("Swept {} expired shared entries", sweep.expired.len());
        }

        let id = generate_id(now);
        let mut entries: Vec<SharedCodeEntry> = sweep.kept.into_iter().map(|(_, entry)| entry).collect();
        entries.push(entry.into_entry(id.clone(), now));
        save_shared(self.medium.as_ref(), &entries).await?;

        info!("Shared snippet {}", id);
        Ok(id)
    }

    /// Looks up a shared snippet. An expired entry is deleted and reads as absent.
    pub async fn get(&self, id: &str) -> Option<SharedCodeEntry> {
        match self.try_get(id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read shared snippet {}: {}", id, e);
                None
            }
        }
    }

    async fn try_get(&self, id: &str) -> Result<Option<SharedCodeEntry>> {
        let _guard = self.aggregate_lock.lock().await;
        let now = self.clock.now_ms();

        let records = load_shared(self.medium.as_ref()).await?;
        let Some(found) = records.iter().find(|r| r.id == id) else {
            return Ok(None);
        };

        match &found.entry {
            Some(entry) if !is_expired(entry.created_at, self.policy.ttl_ms(Namespace::Shared), now) => {
                Ok(Some(entry.clone()))
            }
            _ => {
                debug!("Shared snippet {} expired on read", id);
                let remaining = records.iter().filter(|r| r.id != id).filter_map(|r| r.entry.as_ref());
                save_shared(self.medium.as_ref(), remaining).await?;
                Ok(None)
            }
        }
    }

    pub async fn remove(&self, id: &str) {
        if let Err(e) = self.try_remove(id).await {
            warn!("Failed to remove shared snippet {}: {}", id, e);
        }
    }

    async fn try_remove(&self, id: &str) -> Result<()> {
        let _guard = self.aggregate_lock.lock().await;

        let records = load_shared(self.medium.as_ref()).await?;
        if records.iter().any(|r| r.id == id) {
            let remaining = records.iter().filter(|r| r.id != id).filter_map(|r| r.entry.as_ref());
            save_shared(self.medium.as_ref(), remaining).await?;
            debug!("Removed shared snippet {}", id);
        }
        Ok(())
    }

    /// Saves the user's current edit of `id`. Live editors should go through
    /// [`PersistDebouncer`](crate::PersistDebouncer).
    pub async fn persist(&self, id: &str, code: &str, language_id: &str) {
        if let Err(e) = self.try_persist(id, code, language_id).await {
            warn!("Failed to persist edit for {}: {}", id, e);
        }
    }

    async fn try_persist(&self, id: &str, code: &str, language_id: &str) -> Result<()> {
        let entry = PersistedCodeEntry {
            code: code.to_string(),
            language_id: language_id.to_string(),
            saved_at: self.clock.now_ms(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.medium.put(persisted_key(id).as_bytes(), &bytes).await?;
        debug!("Persisted {} bytes of {} for {}", code.len(), language_id, id);
        Ok(())
    }

    pub async fn get_persisted(&self, id: &str) -> Option<PersistedCode> {
        match self.try_get_persisted(id).await {
            Ok(code) => code,
            Err(e) => {
                warn!("Failed to read persisted edit for {}: {}", id, e);
                None
            }
        }
    }

    async fn try_get_persisted(&self, id: &str) -> Result<Option<PersistedCode>> {
        let key = persisted_key(id);
        let Some(bytes) = self.medium.get(key.as_bytes()).await? else {
            return Ok(None);
        };

        let entry = match decode_persisted(&key, &bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Dropping persisted edit: {}", e);
                self.medium.delete(key.as_bytes()).await?;
                return Ok(None);
            }
        };

        if is_expired(entry.saved_at, self.policy.ttl_ms(Namespace::Persisted), self.clock.now_ms()) {
            debug!("Persisted edit for {} expired on read", id);
            self.medium.delete(key.as_bytes()).await?;
            return Ok(None);
        }

        Ok(Some(entry.into()))
    }

    /// Drops the edit for `id`; the shared entry stays as the reset target.
    pub async fn clear_persisted(&self, id: &str) {
        if let Err(e) = self.medium.delete(persisted_key(id).as_bytes()).await {
            warn!("Failed to clear persisted edit for {}: {}", id, e);
        }
    }

    /// Playground state for `id`: the live persisted edit, else the live
    /// shared entry, else the fallback's default snippet.
    pub async fn restore(&self, id: &str, fallback: Fallback<'_>) -> RestoredSnippet {
        if let Some(persisted) = self.get_persisted(id).await {
            return RestoredSnippet {
                code: persisted.code,
                language_id: persisted.language_id,
                origin: SnippetOrigin::Persisted,
            };
        }
        self.original(id, fallback).await
    }

    /// "Reset to original": the shared entry when it exists, else the default
    /// snippet. Persisted edits are never consulted.
    pub async fn original(&self, id: &str, fallback: Fallback<'_>) -> RestoredSnippet {
        match self.get(id).await {
            Some(shared) => RestoredSnippet {
                code: shared.code,
                language_id: shared.language_id,
                origin: SnippetOrigin::Shared,
            },
            None => fallback.restored(),
        }
    }
}
