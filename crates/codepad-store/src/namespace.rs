//! Key layout, TTL policy and the one sweep routine every caller shares.
//!
//! Shared snippets live together as a JSON object (id → entry) under
//! [`SHARED_KEY`]. Persisted edits get one record each under
//! [`PERSISTED_PREFIX`] followed by the snippet id.

use crate::entry::{PersistedCodeEntry, SharedCodeEntry};
use crate::error::{Result, StorageError};
use crate::medium::StorageMedium;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const SHARED_KEY: &str = "codepad:shared-code";
pub const PERSISTED_PREFIX: &str = "codepad:persisted:";

pub const SHARED_TTL: Duration = Duration::from_secs(30 * 60);
pub const PERSISTED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Shared,
    Persisted,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Shared, Namespace::Persisted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Shared => "shared",
            Namespace::Persisted => "persisted",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lifetime of each record class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub shared: Duration,
    pub persisted: Duration,
}

impl TtlPolicy {
    pub fn ttl(&self, namespace: Namespace) -> Duration {
        match namespace {
            Namespace::Shared => self.shared,
            Namespace::Persisted => self.persisted,
        }
    }

    pub fn ttl_ms(&self, namespace: Namespace) -> i64 {
        duration_ms(self.ttl(namespace))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            shared: SHARED_TTL,
            persisted: PERSISTED_TTL,
        }
    }
}

pub fn persisted_key(id: &str) -> String {
    format!("{}{}", PERSISTED_PREFIX, id)
}

pub(crate) fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

pub trait Timestamped {
    fn timestamp_ms(&self) -> i64;
}

pub fn is_expired(timestamp_ms: i64, max_age_ms: i64, now_ms: i64) -> bool {
    now_ms.saturating_sub(timestamp_ms) > max_age_ms
}

/// Outcome of [`partition_expired`], input order preserved on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sweep<K, T> {
    pub kept: Vec<(K, T)>,
    pub expired: Vec<K>,
}

/// Splits entries into live and expired. An entry that failed to decode
/// (`None`) is expired regardless of age.
pub fn partition_expired<K, T, I>(entries: I, max_age_ms: i64, now_ms: i64) -> Sweep<K, T>
where
    I: IntoIterator<Item = (K, Option<T>)>,
    T: Timestamped,
{
    let mut sweep = Sweep {
        kept: Vec::new(),
        expired: Vec::new(),
    };

    for (key, entry) in entries {
        match entry {
            Some(entry) if !is_expired(entry.timestamp_ms(), max_age_ms, now_ms) => sweep.kept.push((key, entry)),
            _ => sweep.expired.push(key),
        }
    }

    sweep
}

/// One stored record as found on the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<T> {
    pub id: String,
    /// Medium key holding the record, byte for byte.
    pub key: Vec<u8>,
    pub size_bytes: usize,
    /// `None` when the bytes did not decode.
    pub entry: Option<T>,
}

impl<T> Record<T> {
    pub fn into_pair(self) -> (String, Option<T>) {
        (self.id, self.entry)
    }

    pub fn into_keyed(self) -> (Vec<u8>, Option<T>) {
        (self.key, self.entry)
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(entry) => Some(entry),
        Err(e) => {
            debug!("Skipping undecodable entry {}: {}", key, e);
            None
        }
    }
}

/// Reads the aggregate map. A blob that is not a JSON object comes back as a
/// single undecodable record keyed by [`SHARED_KEY`].
pub(crate) async fn load_shared(medium: &dyn StorageMedium) -> Result<Vec<Record<SharedCodeEntry>>> {
    let Some(bytes) = medium.get(SHARED_KEY.as_bytes()).await? else {
        return Ok(Vec::new());
    };

    let map = match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&bytes) {
        Ok(map) => map,
        Err(e) => {
            debug!("Aggregate record is corrupt: {}", e);
            return Ok(vec![Record {
                id: SHARED_KEY.to_string(),
                key: SHARED_KEY.as_bytes().to_vec(),
                size_bytes: bytes.len(),
                entry: None,
            }]);
        }
    };

    Ok(map
        .into_iter()
        .map(|(id, value)| {
            let size_bytes = id.len() + value.to_string().len();
            let entry = decode::<SharedCodeEntry>(&id, value);
            Record {
                id,
                key: SHARED_KEY.as_bytes().to_vec(),
                size_bytes,
                entry,
            }
        })
        .collect())
}

/// Writes the aggregate map back, deleting the key once nothing is left.
pub(crate) async fn save_shared<'a, I>(medium: &dyn StorageMedium, entries: I) -> Result<()>
where
    I: IntoIterator<Item = &'a SharedCodeEntry>,
{
    let mut map = serde_json::Map::new();
    for entry in entries {
        map.insert(entry.id.clone(), serde_json::to_value(entry)?);
    }

    if map.is_empty() {
        medium.delete(SHARED_KEY.as_bytes()).await
    } else {
        let bytes = serde_json::to_vec(&map)?;
        medium.put(SHARED_KEY.as_bytes(), &bytes).await
    }
}

pub(crate) async fn load_persisted(medium: &dyn StorageMedium) -> Result<Vec<Record<PersistedCodeEntry>>> {
    let records = medium.scan_prefix(PERSISTED_PREFIX.as_bytes()).await?;

    Ok(records
        .into_iter()
        .map(|(key, value)| {
            let size_bytes = key.len() + value.len();
            let name = String::from_utf8_lossy(&key).into_owned();
            let id = name.strip_prefix(PERSISTED_PREFIX).unwrap_or(&name).to_string();
            let entry = match (std::str::from_utf8(&key), serde_json::from_slice::<serde_json::Value>(&value)) {
                (Err(_), _) => {
                    debug!("Skipping entry with a non-UTF-8 key {}", name);
                    None
                }
                (Ok(_), Ok(value)) => decode::<PersistedCodeEntry>(&name, value),
                (Ok(_), Err(e)) => {
                    debug!("Skipping non-JSON entry {}: {}", name, e);
                    None
                }
            };
            Record {
                id,
                key,
                size_bytes,
                entry,
            }
        })
        .collect())
}

pub(crate) fn decode_persisted(key: &str, bytes: &[u8]) -> Result<PersistedCodeEntry> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Stamp(i64);

    impl Timestamped for Stamp {
        fn timestamp_ms(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        assert!(!is_expired(0, 1_000, 1_000));
        assert!(is_expired(0, 1_000, 1_001));
    }

    #[test]
    fn test_corrupt_entries_are_expired() {
        let entries = vec![("a", Some(Stamp(100))), ("b", None), ("c", Some(Stamp(0)))];

        let sweep = partition_expired(entries, 50, 120);

        assert_eq!(sweep.kept.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(sweep.expired, vec!["b", "c"]);
    }

    #[test]
    fn test_default_policy() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_ms(Namespace::Shared), 30 * 60 * 1000);
        assert_eq!(policy.ttl_ms(Namespace::Persisted), 24 * 60 * 60 * 1000);
        assert_eq!(persisted_key("abc"), "codepad:persisted:abc");
    }

    proptest! {
        #[test]
        fn prop_partition_is_exact(
            stamps in prop::collection::vec(prop::option::of(0i64..10_000), 0..64),
            max_age in 0i64..5_000,
            now in 5_000i64..15_000,
        ) {
            let entries: Vec<_> = stamps.iter().enumerate().map(|(i, s)| (i, s.map(Stamp))).collect();

            let sweep = partition_expired(entries, max_age, now);

            prop_assert_eq!(sweep.kept.len() + sweep.expired.len(), stamps.len());
            for (i, stamp) in &sweep.kept {
                prop_assert!(now - stamp.0 <= max_age);
                prop_assert_eq!(stamps[*i], Some(stamp.0));
            }
            for i in &sweep.expired {
                prop_assert!(stamps[*i].map_or(true, |s| now - s > max_age));
            }
            prop_assert!(sweep.kept.windows(2).all(|w| w[0].0 < w[1].0));
            prop_assert!(sweep.expired.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
