use crate::error::Result;
use crate::medium::StorageMedium;
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// RocksDB-backed medium for snippets that survive restarts.
pub struct RocksDbMedium {
    db: Arc<RwLock<DB>>,
    path: PathBuf,
}

impl RocksDbMedium {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Snippet records are small and read by exact key.
        opts.set_write_buffer_size(4 * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.optimize_for_point_lookup(64);

        let db = DB::open(&opts, &path)?;
        info!("Opened snippet store at {}", path.display());

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StorageMedium for RocksDbMedium {
    fn name(&self) -> &str {
        "rocksdb"
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let db = self.db.write().await;
        db.put(key, value)?;
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let db = self.db.read().await;
        Ok(db.get(key)?)
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        let db = self.db.write().await;
        db.delete(key)?;
        Ok(())
    }

    async fn get_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let db = self.db.read().await;
        let iter = db.iterator(IteratorMode::From(prefix, Direction::Forward));

        let mut keys = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }

        Ok(keys)
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let db = self.db.read().await;
        let iter = db.iterator(IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }

        Ok(entries)
    }
}
