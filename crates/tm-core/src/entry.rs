//! Finalized time entries, either booked from a tracker or entered manually.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntryId, Metadata, OwnerId, ValidationError, checked_i64, format_hms};

/// Minimum description length, in characters, after trimming.
pub const DESCRIPTION_MIN_CHARS: usize = 3;

/// Maximum description length, in characters, after trimming.
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

/// How far past the current instant an entry may end (clock-skew tolerance).
pub const MAX_END_SKEW_MINUTES: i64 = 5;

/// Caller-supplied fields of a time entry, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub description: String,
    pub duration_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A validated time entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: EntryId,
    pub owner: OwnerId,
    /// Trimmed description.
    pub description: String,
    pub duration_seconds: u64,
    /// Present for entries booked from a tracker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub booked_from_tracker: bool,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl TimeEntry {
    /// Validates `draft` and creates a new entry with a fresh ID.
    pub fn create(
        owner: OwnerId,
        draft: EntryDraft,
        booked_from_tracker: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let checked = CheckedDraft::new(draft, now)?;
        Ok(Self {
            id: EntryId::generate(),
            owner,
            description: checked.description,
            duration_seconds: checked.duration_seconds,
            start_time: checked.start_time,
            end_time: checked.end_time,
            booked_from_tracker,
            metadata: checked.metadata,
            created_at: now,
        })
    }

    /// Replaces every editable field with `draft`, re-validating.
    ///
    /// The ID, owner, provenance flag and creation time are kept.
    pub fn replace(&self, draft: EntryDraft, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let checked = CheckedDraft::new(draft, now)?;
        Ok(Self {
            id: self.id.clone(),
            owner: self.owner.clone(),
            description: checked.description,
            duration_seconds: checked.duration_seconds,
            start_time: checked.start_time,
            end_time: checked.end_time,
            booked_from_tracker: self.booked_from_tracker,
            metadata: checked.metadata,
            created_at: self.created_at,
        })
    }

    /// The editable fields of this entry, for building an update.
    pub fn to_draft(&self) -> Result<EntryDraft, ValidationError> {
        Ok(EntryDraft {
            description: self.description.clone(),
            duration_seconds: checked_i64("duration_seconds", self.duration_seconds)?,
            start_time: self.start_time,
            end_time: self.end_time,
            metadata: self.metadata.clone(),
        })
    }

    /// Duration as `HH:MM:SS`.
    pub fn duration_display(&self) -> String {
        format_hms(self.duration_seconds)
    }
}

struct CheckedDraft {
    description: String,
    duration_seconds: u64,
    start_time: Option<DateTime<Utc>>,
    end_time: DateTime<Utc>,
    metadata: Metadata,
}

impl CheckedDraft {
    fn new(draft: EntryDraft, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let description = validate_description(&draft.description)?;

        let duration_seconds = u64::try_from(draft.duration_seconds)
            .ok()
            .filter(|secs| *secs >= 1)
            .ok_or(ValidationError::NonPositiveDuration {
                seconds: draft.duration_seconds,
            })?;

        if let Some(start) = draft.start_time.filter(|start| *start >= draft.end_time) {
            return Err(ValidationError::StartNotBeforeEnd {
                start,
                end: draft.end_time,
            });
        }

        let limit = now + Duration::minutes(MAX_END_SKEW_MINUTES);
        if draft.end_time > limit {
            return Err(ValidationError::EndInFuture {
                end: draft.end_time,
                limit,
            });
        }

        Ok(Self {
            description,
            duration_seconds,
            start_time: draft.start_time,
            end_time: draft.end_time,
            metadata: draft.metadata,
        })
    }
}

fn validate_description(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty {
            field: "description",
        });
    }
    let len = trimmed.chars().count();
    if len < DESCRIPTION_MIN_CHARS {
        return Err(ValidationError::DescriptionTooShort {
            min: DESCRIPTION_MIN_CHARS,
            len,
        });
    }
    if len > DESCRIPTION_MAX_CHARS {
        return Err(ValidationError::DescriptionTooLong {
            max: DESCRIPTION_MAX_CHARS,
            len,
        });
    }
    Ok(trimmed.to_string())
}
