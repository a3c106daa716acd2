//! The tracker API consumed by outer layers.
//!
//! # Concurrency
//!
//! Every tracker mutation is a read-modify-write cycle against the
//! [`Store`]. Two layers keep concurrent requests for the same owner from
//! losing time:
//!
//! - Within one [`TrackerService`], requests for the same owner take a
//!   per-owner lock, so they run one after another. Different owners never
//!   contend.
//! - Across services (other processes sharing the database), the store
//!   rejects stale writes with [`StoreError::Conflict`]. The cycle is then
//!   retried from a fresh read, up to `max_attempts` times, before
//!   [`TrackerError::Conflict`] is returned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::entry::{EntryDraft, TimeEntry};
use crate::store::{Store, StoreError, Versioned};
use crate::tracker::{Action, TrackerSession, TrackerStatus, Transition};
use crate::types::{EntryId, OwnerId, ValidationError};

/// Default bound on read-modify-write attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Errors returned by [`TrackerService`].
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Booking was attempted before the owner ever had a tracker.
    #[error("no active tracker session found for {owner}")]
    NoActiveSession { owner: OwnerId },

    #[error("no time tracked to book")]
    NothingToBook,

    /// Concurrent writers kept winning the race.
    #[error("tracker for {owner} kept changing concurrently; gave up after {attempts} attempts")]
    Conflict { owner: OwnerId, attempts: u32 },

    /// The entry was stored but the tracker could not be reset.
    ///
    /// The tracker still shows the booked time and must be reconciled.
    #[error("booked entry {} but failed to reset the tracker: {source}", .entry.id)]
    PartialBooking {
        entry: Box<TimeEntry>,
        #[source]
        source: StoreError,
    },

    #[error("time entry not found: {id}")]
    EntryNotFound { id: EntryId },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TrackerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EntryNotFound { id } => Self::EntryNotFound { id },
            other => Self::Store(other),
        }
    }
}

/// Result of [`TrackerService::apply_action`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub transition: Transition,
    pub message: &'static str,
    pub tracker: TrackerStatus,
}

/// Per-owner mutexes, created on first use.
#[derive(Debug, Default)]
pub(crate) struct OwnerLocks {
    locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    /// Runs `f` while holding `owner`'s lock.
    pub(crate) fn with_owner<R>(&self, owner: &OwnerId, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(owner.clone()).or_default())
        };
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// Tracker state machine, booking and entry management over a [`Store`].
#[derive(Debug)]
pub struct TrackerService<S, C = SystemClock> {
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) locks: OwnerLocks,
    max_attempts: u32,
}

impl<S: Store> TrackerService<S> {
    /// A service reading the wall clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: Store, C: Clock> TrackerService<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            locks: OwnerLocks::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the read-modify-write retry bound (at least one attempt).
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Current tracker status, creating an idle tracker on first use.
    pub fn status(&self, owner: &OwnerId) -> Result<TrackerStatus, TrackerError> {
        self.locks.with_owner(owner, || {
            self.retrying(owner, |current| {
                let now = self.clock.now();
                match current {
                    Some(Versioned { value, .. }) => Ok((None, value.status(now))),
                    None => {
                        let session = TrackerSession::new(owner.clone());
                        let status = session.status(now);
                        Ok((Some(PendingWrite::tracker(session, None)), status))
                    }
                }
            })
        })
    }

    /// Applies a start/pause/resume/reset action.
    ///
    /// No-op transitions succeed without writing (unless the tracker has to
    /// be created).
    pub fn apply_action(
        &self,
        owner: &OwnerId,
        action: Action,
    ) -> Result<ActionOutcome, TrackerError> {
        let outcome = self.locks.with_owner(owner, || {
            self.retrying(owner, |current| {
                let now = self.clock.now();
                let (mut session, version) = match current {
                    Some(Versioned { value, version }) => (value, Some(version)),
                    None => (TrackerSession::new(owner.clone()), None),
                };
                let transition = session.apply(action, now);
                let outcome = ActionOutcome {
                    transition,
                    message: transition.message(),
                    tracker: session.status(now),
                };
                let write = (transition.changed() || version.is_none())
                    .then(|| PendingWrite::tracker(session, version));
                Ok((write, outcome))
            })
        })?;

        if outcome.transition.changed() {
            tracing::info!(%owner, %action, message = outcome.message, "tracker transition applied");
        } else {
            tracing::debug!(%owner, %action, message = outcome.message, "tracker action was a no-op");
        }
        Ok(outcome)
    }

    /// Parses `action` and applies it.
    pub fn apply_named_action(
        &self,
        owner: &OwnerId,
        action: &str,
    ) -> Result<ActionOutcome, TrackerError> {
        let action = action.parse::<Action>()?;
        self.apply_action(owner, action)
    }

    /// Creates a manual entry. Manual entries never touch the tracker.
    pub fn create_entry(
        &self,
        owner: &OwnerId,
        draft: EntryDraft,
    ) -> Result<TimeEntry, TrackerError> {
        let entry = TimeEntry::create(owner.clone(), draft, false, self.clock.now())?;
        self.store.create_time_entry(&entry)?;
        tracing::info!(%owner, entry_id = %entry.id, duration = entry.duration_seconds, "created manual time entry");
        Ok(entry)
    }

    /// Replaces an entry's editable fields, re-validating them.
    pub fn update_entry(
        &self,
        owner: &OwnerId,
        id: &EntryId,
        draft: EntryDraft,
    ) -> Result<TimeEntry, TrackerError> {
        let existing = self.get_entry(owner, id)?;
        let updated = existing.replace(draft, self.clock.now())?;
        self.store.update_time_entry(&updated)?;
        tracing::info!(%owner, entry_id = %id, "updated time entry");
        Ok(updated)
    }

    pub fn get_entry(&self, owner: &OwnerId, id: &EntryId) -> Result<TimeEntry, TrackerError> {
        self.store
            .get_time_entry(owner, id)?
            .ok_or_else(|| TrackerError::EntryNotFound { id: id.clone() })
    }

    /// The owner's entries, most recent first.
    pub fn list_entries(&self, owner: &OwnerId) -> Result<Vec<TimeEntry>, TrackerError> {
        Ok(self.store.list_time_entries(owner)?)
    }

    pub fn delete_entry(&self, owner: &OwnerId, id: &EntryId) -> Result<(), TrackerError> {
        if !self.store.delete_time_entry(owner, id)? {
            return Err(TrackerError::EntryNotFound { id: id.clone() });
        }
        tracing::info!(%owner, entry_id = %id, "deleted time entry");
        Ok(())
    }

    /// Removes the owner's tracker and every entry they own.
    pub fn delete_owner(&self, owner: &OwnerId) -> Result<(), TrackerError> {
        self.locks.with_owner(owner, || self.store.delete_owner(owner))?;
        tracing::info!(%owner, "deleted tracker and time entries for owner");
        Ok(())
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs one read-modify-write cycle, retrying on version conflicts.
    ///
    /// `step` receives the freshly loaded tracker and returns an optional
    /// write together with the result to hand back once that write
    /// succeeds.
    pub(crate) fn retrying<R>(
        &self,
        owner: &OwnerId,
        mut step: impl FnMut(
            Option<Versioned<TrackerSession>>,
        ) -> Result<(Option<PendingWrite>, R), TrackerError>,
    ) -> Result<R, TrackerError> {
        for attempt in 1..=self.max_attempts {
            let current = self.store.load_tracker(owner)?;
            let (write, result) = step(current)?;
            let Some(write) = write else {
                return Ok(result);
            };
            match self.commit(write) {
                Ok(version) => {
                    tracing::debug!(%owner, version, "saved tracker");
                    return Ok(result);
                }
                Err(TrackerError::Store(StoreError::Conflict { .. })) => {
                    tracing::warn!(%owner, attempt, max = self.max_attempts, "tracker write lost a race; retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(TrackerError::Conflict {
            owner: owner.clone(),
            attempts: self.max_attempts,
        })
    }

    fn commit(&self, write: PendingWrite) -> Result<u64, TrackerError> {
        match write {
            PendingWrite::Tracker { session, expected } => {
                Ok(self.store.save_tracker(&session, expected)?)
            }
            PendingWrite::Booking {
                entry,
                session,
                expected,
            } => match self.store.book_time_entry(&entry, &session, expected) {
                Ok(version) => Ok(version),
                Err(StoreError::TrackerNotReset { source }) => {
                    tracing::error!(
                        owner = %entry.owner,
                        entry_id = %entry.id,
                        duration = entry.duration_seconds,
                        error = %source,
                        "time entry created but tracker reset failed; tracker needs reconciliation"
                    );
                    Err(TrackerError::PartialBooking {
                        entry: Box::new(entry),
                        source: *source,
                    })
                }
                Err(err) => Err(err.into()),
            },
        }
    }
}

/// A tracker write computed by one read-modify-write step.
#[derive(Debug)]
pub(crate) enum PendingWrite {
    /// Save the tracker against the version it was read at (`None` creates it).
    Tracker {
        session: TrackerSession,
        expected: Option<u64>,
    },
    /// Store a booked entry together with the reset tracker.
    Booking {
        entry: TimeEntry,
        session: TrackerSession,
        expected: u64,
    },
}

impl PendingWrite {
    const fn tracker(session: TrackerSession, expected: Option<u64>) -> Self {
        Self::Tracker { session, expected }
    }
}
