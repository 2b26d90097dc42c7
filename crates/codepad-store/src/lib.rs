pub mod clock;
pub mod debounce;
pub mod entry;
pub mod error;
pub mod id;
pub mod janitor;
pub mod medium;
pub mod memory;
pub mod namespace;
pub mod rocks;
pub mod sharing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::{Debouncer, PersistDebouncer};
pub use entry::{NewSharedCode, PersistedCode, PersistedCodeEntry, SharedCodeEntry};
pub use error::{Result, StorageError};
pub use janitor::{EntryInfo, Janitor, JanitorOptions, StorageStats, UsageEstimate};
pub use medium::StorageMedium;
pub use memory::MemoryMedium;
pub use namespace::{Namespace, TtlPolicy, PERSISTED_PREFIX, SHARED_KEY};
pub use rocks::RocksDbMedium;
pub use sharing::{Fallback, RestoredSnippet, SharingStore, SnippetOrigin};
