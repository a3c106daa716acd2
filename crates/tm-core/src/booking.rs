//! Booking: turning tracked time into a time entry.
//!
//! A booking is one read-modify-write cycle: the tracker is read, the entry
//! is built from its elapsed time, and the entry is stored together with
//! the reset tracker through [`Store::book_time_entry`], conditional on the
//! version that was read. A booking that loses the race to another writer
//! stores nothing and is retried from a fresh read, so time booked by a
//! concurrent request is never booked twice. If the entry creation fails,
//! the tracker is untouched. If a backend cannot write both at once and the
//! reset fails after the entry was stored, the caller gets
//! [`TrackerError::PartialBooking`] so the stale tracker can be reconciled.
//!
//! The booked `start_time` is the tracker's `started_at`: the start of the
//! last segment, not of the first one when the tracker was paused and
//! resumed in between. It is left empty when that segment did not start
//! strictly before the booking, as right after a resume or after the clock
//! moved backwards; the banked time is still booked.

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::entry::{EntryDraft, TimeEntry};
use crate::service::{PendingWrite, TrackerError, TrackerService};
use crate::store::{Store, Versioned};
use crate::tracker::TrackerSession;
use crate::types::{Metadata, OwnerId, checked_i64};

impl<S: Store, C: Clock> TrackerService<S, C> {
    /// Books the owner's tracked time as an entry and resets the tracker.
    pub fn book(
        &self,
        owner: &OwnerId,
        description: &str,
        metadata: Metadata,
    ) -> Result<TimeEntry, TrackerError> {
        let entry = self.locks.with_owner(owner, || {
            self.retrying(owner, |current| {
                let Some(Versioned {
                    value: session,
                    version,
                }) = current
                else {
                    return Err(TrackerError::NoActiveSession {
                        owner: owner.clone(),
                    });
                };
                let now = self.now();
                let (entry, reset) = booked_entry(session, description, metadata.clone(), now)?;
                let write = PendingWrite::Booking {
                    entry: entry.clone(),
                    session: reset,
                    expected: version,
                };
                Ok((Some(write), entry))
            })
        })?;
        tracing::info!(%owner, entry_id = %entry.id, duration = entry.duration_seconds, "booked tracker time");
        Ok(entry)
    }
}

/// Builds the entry for `session`'s elapsed time and the reset session.
fn booked_entry(
    mut session: TrackerSession,
    description: &str,
    metadata: Metadata,
    now: DateTime<Utc>,
) -> Result<(TimeEntry, TrackerSession), TrackerError> {
    let duration = session.elapsed_seconds(now);
    if duration == 0 {
        tracing::debug!(owner = %session.owner(), "nothing to book");
        return Err(TrackerError::NothingToBook);
    }

    let draft = EntryDraft {
        description: description.to_string(),
        duration_seconds: checked_i64("duration_seconds", duration)?,
        start_time: session.started_at().filter(|start| *start < now),
        end_time: now,
        metadata,
    };
    let entry = TimeEntry::create(session.owner().clone(), draft, true, now)?;
    session.reset(now);
    Ok((entry, session))
}
