use crate::config::{CodepadConfig, StorageBackend};
use anyhow::Result;
use codepad_runtime::LanguageRegistry;
use codepad_store::{Fallback, Janitor, MemoryMedium, RocksDbMedium, SharingStore, StorageMedium, SystemClock};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Store and janitor opened from the configured medium.
pub struct StoreContext {
    pub config: CodepadConfig,
    pub store: Arc<SharingStore>,
    pub janitor: Arc<Janitor>,
}

impl StoreContext {
    pub async fn open(config: CodepadConfig) -> Result<Self> {
        let medium: Arc<dyn StorageMedium> = match config.storage.backend {
            StorageBackend::RocksDB => Arc::new(RocksDbMedium::open(&config.storage.path).await?),
            StorageBackend::Memory => {
                warn!("Using in-memory storage; shared snippets end with this process");
                Arc::new(MemoryMedium::new())
            }
        };
        info!("Snippet storage: {}", medium.name());

        let store = SharingStore::new(medium, Arc::new(SystemClock)).with_policy(config.ttl_policy());
        let janitor = Janitor::new(&store, config.janitor_options());

        Ok(Self {
            config,
            store: Arc::new(store),
            janitor: Arc::new(janitor),
        })
    }
}

impl StoreContext {
    /// Schedules the startup expiry sweep when `janitor.auto_cleanup` is on.
    pub fn start_cleanup(&self) -> Option<JoinHandle<usize>> {
        let janitor = &self.config.janitor;
        janitor
            .auto_cleanup
            .then(|| self.janitor.auto_cleanup(janitor.auto_cleanup_delay()))
    }
}

/// Waits for the startup sweep so it completes before the process exits.
pub async fn finish_cleanup(sweep: Option<JoinHandle<usize>>) -> usize {
    let Some(sweep) = sweep else {
        return 0;
    };
    match sweep.await {
        Ok(removed) => {
            debug!("Startup cleanup removed {} entries", removed);
            removed
        }
        Err(e) => {
            warn!("Startup cleanup did not complete: {}", e);
            0
        }
    }
}

/// Default snippet of `language`, for restore fallbacks.
pub fn fallback_for(language: &str) -> Result<Fallback<'static>> {
    let descriptor = LanguageRegistry::builtin()
        .find(language)
        .ok_or_else(|| anyhow::anyhow!("Unknown language: {}", language))?;

    Ok(Fallback {
        language_id: descriptor.id,
        default_snippet: descriptor.default_snippet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepad_store::SHARED_KEY;

    fn memory_config(auto_cleanup: bool) -> CodepadConfig {
        let mut config = CodepadConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.janitor.auto_cleanup = auto_cleanup;
        config.janitor.auto_cleanup_delay_ms = 10;
        config
    }

    #[tokio::test]
    async fn test_startup_cleanup_runs_after_command() {
        let ctx = StoreContext::open(memory_config(true)).await.unwrap();
        let stale = r#"{"old":{"id":"old","languageId":"javascript","code":"1","createdAt":0}}"#;
        ctx.store.medium().put(SHARED_KEY.as_bytes(), stale.as_bytes()).await.unwrap();

        let sweep = ctx.start_cleanup();
        ctx.store.persist("draft", "let a = 1;", "javascript").await;

        assert_eq!(finish_cleanup(sweep).await, 1);
        assert!(!ctx.store.medium().exists(SHARED_KEY.as_bytes()).await.unwrap());
        assert!(ctx.store.get_persisted("draft").await.is_some());
    }

    #[tokio::test]
    async fn test_startup_cleanup_can_be_disabled() {
        let ctx = StoreContext::open(memory_config(false)).await.unwrap();

        let sweep = ctx.start_cleanup();

        assert!(sweep.is_none());
        assert_eq!(finish_cleanup(sweep).await, 0);
    }

    #[test]
    fn test_fallback_uses_default_snippet() {
        let fallback = fallback_for("ts").unwrap();
        assert_eq!(fallback.language_id, "typescript");
        assert!(fallback_for("cobol").is_err());
    }
}
