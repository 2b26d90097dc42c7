use codepad_store::janitor::{DEFAULT_AUTO_CLEANUP_DELAY, DEFAULT_MAX_AGE, DEFAULT_STORAGE_CEILING};
use codepad_store::{JanitorOptions, TtlPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "CODEPAD_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "codepad.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodepadConfig {
    pub storage: StorageConfig,

    pub sharing: SharingConfig,

    pub janitor: JanitorConfig,

    pub runtime: RuntimeConfig,
}

impl CodepadConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: CodepadConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects durations too large to represent.
    pub fn validate(&self) -> anyhow::Result<()> {
        let checks = [
            ("sharing.shared_ttl_minutes", self.sharing.shared_ttl_minutes, 60),
            ("sharing.persisted_ttl_hours", self.sharing.persisted_ttl_hours, 3600),
            ("janitor.max_age_days", self.janitor.max_age_days, 86_400),
        ];
        for (field, value, unit_secs) in checks {
            if value.checked_mul(unit_secs).is_none() {
                anyhow::bail!("{} = {} is out of range", field, value);
            }
        }
        Ok(())
    }

    /// Resolves the config file from `--config`, then `CODEPAD_CONFIG`, then
    /// `./codepad.toml`. A missing default file means built-in defaults; an
    /// explicitly named file must exist.
    pub fn load(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        let named = explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        if let Some(path) = named {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            info!("Loaded configuration from {}", path.display());
            return Self::from_file(&path);
        }

        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            debug!("Loaded configuration from {}", default_path.display());
            Self::from_file(&default_path)
        } else {
            debug!("Using default configuration");
            Ok(Self::default())
        }
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            shared: Duration::from_secs(self.sharing.shared_ttl_minutes.saturating_mul(60)),
            persisted: Duration::from_secs(self.sharing.persisted_ttl_hours.saturating_mul(3600)),
        }
    }

    pub fn janitor_options(&self) -> JanitorOptions {
        JanitorOptions {
            storage_ceiling_bytes: self.janitor.storage_ceiling_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDB,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub backend: StorageBackend,

    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDB,
            path: ".codepad/store".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    pub shared_ttl_minutes: u64,

    pub persisted_ttl_hours: u64,

    pub persist_debounce_ms: u64,
}

impl Default for SharingConfig {
    fn default() -> Self {
        let policy = TtlPolicy::default();
        Self {
            shared_ttl_minutes: policy.shared.as_secs() / 60,
            persisted_ttl_hours: policy.persisted.as_secs() / 3600,
            persist_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    pub auto_cleanup: bool,

    pub auto_cleanup_delay_ms: u64,

    pub max_age_days: u64,

    pub storage_ceiling_bytes: usize,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            auto_cleanup: true,
            auto_cleanup_delay_ms: DEFAULT_AUTO_CLEANUP_DELAY.as_millis() as u64,
            max_age_days: DEFAULT_MAX_AGE.as_secs() / 86_400,
            storage_ceiling_bytes: DEFAULT_STORAGE_CEILING,
        }
    }
}

impl JanitorConfig {
    pub fn auto_cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.auto_cleanup_delay_ms)
    }

    pub fn max_age(&self) -> Duration {
        days(self.max_age_days).unwrap_or(Duration::MAX)
    }
}

/// `count` days, or `None` when that many seconds overflow.
pub fn days(count: u64) -> Option<Duration> {
    count.checked_mul(86_400).map(Duration::from_secs)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Start loading CPython as soon as the CLI starts.
    pub preload_python: bool,
}
