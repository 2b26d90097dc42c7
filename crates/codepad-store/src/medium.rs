use crate::error::Result;
use async_trait::async_trait;

/// Byte-oriented key-value medium the store and janitor sit on.
#[async_trait]
pub trait StorageMedium: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &str;

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, key: &[u8]) -> Result<()>;

    async fn get_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Key/value pairs under `prefix` in key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    async fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
