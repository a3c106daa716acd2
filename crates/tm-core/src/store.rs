//! The persistence boundary.
//!
//! [`Store`] is everything the tracker core needs from storage. Backends
//! must guarantee at most one tracker session per owner and must reject a
//! tracker write whose expected version is stale with
//! [`StoreError::Conflict`]. That version check is what serializes
//! read-modify-write cycles across processes, bookings included: a booked
//! entry is only stored together with a successful tracker reset.

use std::sync::Arc;

use thiserror::Error;

use crate::entry::TimeEntry;
use crate::tracker::TrackerSession;
use crate::types::{EntryId, OwnerId, ValidationError};

/// Storage errors surfaced through the [`Store`] trait.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The tracker row changed since it was read, or a second row was
    /// about to be created for the same owner.
    #[error("tracker for {owner} was modified concurrently")]
    Conflict { owner: OwnerId },

    /// No entry with this ID exists for the owner.
    #[error("time entry not found: {id}")]
    EntryNotFound { id: EntryId },

    /// A stored row failed validation when read back.
    #[error("stored record is invalid: {0}")]
    Invalid(#[from] ValidationError),

    /// A booking's entry was stored but the tracker write that should have
    /// gone with it failed.
    #[error("time entry stored but the tracker was not reset: {source}")]
    TrackerNotReset {
        #[source]
        source: Box<StoreError>,
    },

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// A value together with the storage version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Persistence gateway for tracker sessions and time entries.
pub trait Store: Send + Sync {
    /// Loads the owner's tracker, if one was ever created.
    fn load_tracker(&self, owner: &OwnerId) -> Result<Option<Versioned<TrackerSession>>, StoreError>;

    /// Writes a tracker and returns its new version.
    ///
    /// With `expected_version = None` the tracker must not exist yet; with
    /// `Some(v)` the stored version must still be `v`. Otherwise the write
    /// fails with [`StoreError::Conflict`] and nothing changes.
    fn save_tracker(
        &self,
        session: &TrackerSession,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Durably stores a new entry.
    fn create_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError>;

    /// Stores a booked entry and writes the owner's reset tracker together.
    ///
    /// The tracker write follows the [`Store::save_tracker`] version
    /// contract with `Some(expected_version)`. On [`StoreError::Conflict`]
    /// the entry must not be stored either, so the booking can be retried
    /// from a fresh read.
    ///
    /// The default runs the two writes one after the other. If the tracker
    /// write fails once the entry exists, it returns
    /// [`StoreError::TrackerNotReset`]. Transactional backends override it.
    fn book_time_entry(
        &self,
        entry: &TimeEntry,
        session: &TrackerSession,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.create_time_entry(entry)?;
        self.save_tracker(session, Some(expected_version))
            .map_err(|source| StoreError::TrackerNotReset {
                source: Box::new(source),
            })
    }

    /// Replaces an existing entry (matched by owner and ID).
    fn update_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError>;

    fn get_time_entry(&self, owner: &OwnerId, id: &EntryId)
    -> Result<Option<TimeEntry>, StoreError>;

    /// Lists an owner's entries, most recent `end_time` first.
    fn list_time_entries(&self, owner: &OwnerId) -> Result<Vec<TimeEntry>, StoreError>;

    /// Deletes one entry. Returns whether it existed.
    fn delete_time_entry(&self, owner: &OwnerId, id: &EntryId) -> Result<bool, StoreError>;

    /// Removes the owner's tracker and all their entries.
    fn delete_owner(&self, owner: &OwnerId) -> Result<(), StoreError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn load_tracker(&self, owner: &OwnerId) -> Result<Option<Versioned<TrackerSession>>, StoreError> {
        (**self).load_tracker(owner)
    }

    fn save_tracker(
        &self,
        session: &TrackerSession,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        (**self).save_tracker(session, expected_version)
    }

    fn create_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        (**self).create_time_entry(entry)
    }

    fn book_time_entry(
        &self,
        entry: &TimeEntry,
        session: &TrackerSession,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        (**self).book_time_entry(entry, session, expected_version)
    }

    fn update_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        (**self).update_time_entry(entry)
    }

    fn get_time_entry(
        &self,
        owner: &OwnerId,
        id: &EntryId,
    ) -> Result<Option<TimeEntry>, StoreError> {
        (**self).get_time_entry(owner, id)
    }

    fn list_time_entries(&self, owner: &OwnerId) -> Result<Vec<TimeEntry>, StoreError> {
        (**self).list_time_entries(owner)
    }

    fn delete_time_entry(&self, owner: &OwnerId, id: &EntryId) -> Result<bool, StoreError> {
        (**self).delete_time_entry(owner, id)
    }

    fn delete_owner(&self, owner: &OwnerId) -> Result<(), StoreError> {
        (**self).delete_owner(owner)
    }
}
