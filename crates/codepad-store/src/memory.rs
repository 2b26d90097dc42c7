use crate::error::{Result, StorageError};
use crate::medium::StorageMedium;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// In-process medium with an optional byte quota.
///
/// The quota counts key and value bytes of every stored record, the way a
/// browser origin's storage allowance would. Availability can be switched off
/// to exercise degraded paths.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    quota_bytes: Option<usize>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory medium switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageMedium for MemoryMedium {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_available()?;
        let mut entries = self.entries.write().await;

        if let Some(limit) = self.quota_bytes {
            let replaced = entries.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
            let used: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
            let needed = used - replaced + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }

        entries.insert(key.to_vec(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("memory put {} ({} bytes)", String::from_utf8_lossy(key), value.len());
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_available()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn get_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .scan_prefix(prefix)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_medium() {
        let medium = MemoryMedium::new();

        medium.put(b"test:key1", b"value1").await.unwrap();
        assert_eq!(medium.get(b"test:key1").await.unwrap(), Some(b"value1".to_vec()));

        medium.delete(b"test:key1").await.unwrap();
        assert_eq!(medium.get(b"test:key1").await.unwrap(), None);

        medium.put(b"test:key1", b"value1").await.unwrap();
        medium.put(b"test:key2", b"value2").await.unwrap();
        medium.put(b"other:key1", b"value3").await.unwrap();
        medium.put(b"tesu", b"after").await.unwrap();

        let keys = medium.get_by_prefix(b"test:").await.unwrap();
        assert_eq!(keys, vec![b"test:key1".to_vec(), b"test:key2".to_vec()]);
        assert_eq!(medium.write_count(), 5);
    }

    #[tokio::test]
    async fn test_quota_counts_replacement() {
        let medium = MemoryMedium::with_quota(10);

        medium.put(b"k", b"12345").await.unwrap();
        medium.put(b"k", b"123456789").await.unwrap();

        let err = medium.put(b"j", b"1").await.unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { needed: 12, limit: 10 }));
    }

    #[tokio::test]
    async fn test_unavailable_medium_errors() {
        let medium = MemoryMedium::new();
        medium.set_available(false);

        assert!(matches!(medium.get(b"k").await, Err(StorageError::Unavailable(_))));
        assert!(medium.put(b"k", b"v").await.is_err());

        medium.set_available(true);
        assert!(medium.put(b"k", b"v").await.is_ok());
    }
}
