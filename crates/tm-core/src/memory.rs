//! An in-process [`Store`] backed by hash maps.
//!
//! Useful for tests and for embedding the tracker without a database. All
//! state lives behind one mutex, so every call is atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::entry::TimeEntry;
use crate::store::{Store, StoreError, Versioned};
use crate::tracker::TrackerSession;
use crate::types::{EntryId, OwnerId};

#[derive(Debug, Default)]
struct Inner {
    trackers: HashMap<OwnerId, Versioned<TrackerSession>>,
    entries: HashMap<EntryId, TimeEntry>,
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Inner {
    fn save_tracker(
        &mut self,
        session: &TrackerSession,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let owner = session.owner();
        let current = self.trackers.get(owner).map(|stored| stored.version);
        if current != expected_version {
            return Err(StoreError::Conflict {
                owner: owner.clone(),
            });
        }
        let version = current.map_or(1, |v| v + 1);
        self.trackers.insert(
            owner.clone(),
            Versioned {
                value: session.clone(),
                version,
            },
        );
        Ok(version)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn load_tracker(&self, owner: &OwnerId) -> Result<Option<Versioned<TrackerSession>>, StoreError> {
        Ok(self.lock().trackers.get(owner).cloned())
    }

    fn save_tracker(
        &self,
        session: &TrackerSession,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        self.lock().save_tracker(session, expected_version)
    }

    fn create_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        self.lock().entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    fn book_time_entry(
        &self,
        entry: &TimeEntry,
        session: &TrackerSession,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let version = inner.save_tracker(session, Some(expected_version))?;
        inner.entries.insert(entry.id.clone(), entry.clone());
        Ok(version)
    }

    fn update_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match inner.entries.get_mut(&entry.id) {
            Some(stored) if stored.owner == entry.owner => {
                *stored = entry.clone();
                Ok(())
            }
            _ => Err(StoreError::EntryNotFound {
                id: entry.id.clone(),
            }),
        }
    }

    fn get_time_entry(
        &self,
        owner: &OwnerId,
        id: &EntryId,
    ) -> Result<Option<TimeEntry>, StoreError> {
        Ok(self
            .lock()
            .entries
            .get(id)
            .filter(|entry| &entry.owner == owner)
            .cloned())
    }

    fn list_time_entries(&self, owner: &OwnerId) -> Result<Vec<TimeEntry>, StoreError> {
        let mut entries: Vec<TimeEntry> = self
            .lock()
            .entries
            .values()
            .filter(|entry| &entry.owner == owner)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.end_time
                .cmp(&a.end_time)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(entries)
    }

    fn delete_time_entry(&self, owner: &OwnerId, id: &EntryId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let owned = inner.entries.get(id).is_some_and(|entry| &entry.owner == owner);
        if owned {
            inner.entries.remove(id);
        }
        Ok(owned)
    }

    fn delete_owner(&self, owner: &OwnerId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.trackers.remove(owner);
        inner.entries.retain(|_, entry| &entry.owner != owner);
        Ok(())
    }
}
