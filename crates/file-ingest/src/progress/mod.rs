//! Ephemeral progress channel
//!
//! Holds the last-known status and progress of each file under processing.
//! Entries expire a fixed interval after the write that produced them; the
//! file record store remains the source of truth.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::types::{FileStatus, ProgressSnapshot};

/// A progress entry with its expiry
#[derive(Debug, Clone)]
pub struct ProgressEntry {
    pub snapshot: ProgressSnapshot,
    pub expires_at: DateTime<Utc>,
}

impl ProgressEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Fast, non-authoritative store of per-file progress
pub trait ProgressStore: Send + Sync {
    /// Overwrite the entry for `id`, resetting its expiry
    fn set(&self, id: Uuid, status: FileStatus, progress: u8, error: Option<String>);

    /// Current entry, or `None` when absent or expired
    fn get(&self, id: Uuid) -> Option<ProgressSnapshot>;

    /// Drop the entry for `id`
    fn remove(&self, id: Uuid);
}

/// In-process progress channel backed by a concurrent map
pub struct MemoryProgressStore {
    entries: DashMap<Uuid, ProgressEntry>,
    ttl: Duration,
}

impl MemoryProgressStore {
    /// Create a store whose entries live `ttl_secs` after each write
    pub fn new(ttl_secs: u64) -> Self {
        let ttl = Duration::try_seconds(ttl_secs.min(i64::MAX as u64) as i64)
            .unwrap_or(Duration::MAX);
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Number of stored entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("Purged {} expired progress entries", removed);
        }
        removed
    }
}

impl ProgressStore for MemoryProgressStore {
    fn set(&self, id: Uuid, status: FileStatus, progress: u8, error: Option<String>) {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(
            id,
            ProgressEntry {
                snapshot: ProgressSnapshot {
                    status,
                    progress: progress.min(100),
                    error,
                },
                expires_at,
            },
        );
    }

    fn get(&self, id: Uuid) -> Option<ProgressSnapshot> {
        let now = Utc::now();
        {
            let entry = self.entries.get(&id)?;
            if !entry.is_expired(now) {
                return Some(entry.snapshot.clone());
            }
        }
        // expired; the read guard must be released before removal
        self.entries.remove_if(&id, |_, entry| entry.is_expired(now));
        None
    }

    fn remove(&self, id: Uuid) {
        self.entries.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let store = MemoryProgressStore::new(3600);
        let id = Uuid::new_v4();

        assert!(store.get(id).is_none());
        store.set(id, FileStatus::Processing, 30, None);
        store.set(id, FileStatus::Processing, 50, None);

        let snapshot = store.get(id).unwrap();
        assert_eq!(snapshot.status, FileStatus::Processing);
        assert_eq!(snapshot.progress, 50);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_last_write_wins_with_error() {
        let store = MemoryProgressStore::new(3600);
        let id = Uuid::new_v4();
        store.set(id, FileStatus::Processing, 30, None);
        store.set(id, FileStatus::Failed, 30, Some("bad page".into()));

        let snapshot = store.get(id).unwrap();
        assert_eq!(snapshot.status, FileStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("bad page"));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let store = MemoryProgressStore::new(0);
        let id = Uuid::new_v4();
        store.set(id, FileStatus::Processing, 10, None);

        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_and_purge() {
        let store = MemoryProgressStore::new(3600);
        let id = Uuid::new_v4();
        store.set(id, FileStatus::Ready, 100, None);
        store.remove(id);
        assert!(store.get(id).is_none());

        let expiring = MemoryProgressStore::new(0);
        expiring.set(Uuid::new_v4(), FileStatus::Processing, 10, None);
        expiring.set(Uuid::new_v4(), FileStatus::Processing, 20, None);
        assert_eq!(expiring.purge_expired(), 2);
        assert_eq!(expiring.len(), 0);
    }
}
