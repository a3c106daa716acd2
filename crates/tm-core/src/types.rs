//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque key/value metadata attached to a time entry.
///
/// The core never inspects it; it is stored and returned as-is.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The description is shorter than the minimum after trimming.
    #[error("description must be at least {min} characters long, got {len}")]
    DescriptionTooShort { min: usize, len: usize },

    /// The description exceeds the maximum length.
    #[error("description must be at most {max} characters long, got {len}")]
    DescriptionTooLong { max: usize, len: usize },

    /// Durations must be at least one second.
    #[error("duration must be greater than 0 seconds, got {seconds}")]
    NonPositiveDuration { seconds: i64 },

    /// Start time was not strictly before end time.
    #[error("start time {start} must be before end time {end}")]
    StartNotBeforeEnd {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// End time lies beyond the clock-skew tolerance.
    #[error("end time {end} is more than 5 minutes in the future (limit {limit})")]
    EndInFuture {
        end: DateTime<Utc>,
        limit: DateTime<Utc>,
    },

    /// A tracker was paused before its segment started.
    #[error("pause time {paused_at} cannot be before start time {started_at}")]
    PauseBeforeStart {
        started_at: DateTime<Utc>,
        paused_at: DateTime<Utc>,
    },

    /// A tracker record is marked running while also carrying a pause time.
    #[error("tracker cannot be running and paused at the same time")]
    PausedWhileRunning,

    /// A tracker record is running or paused without a segment start.
    #[error("tracker is {state} but has no start time")]
    MissingStart { state: &'static str },

    /// Accumulated seconds went negative.
    #[error("accumulated seconds cannot be negative, got {seconds}")]
    NegativeAccumulated { seconds: i64 },

    /// A counter does not fit the width it is stored or exchanged at.
    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: i128 },

    /// The requested tracker action does not exist.
    #[error("invalid tracker action: {value} (expected start, pause, resume or reset)")]
    UnknownAction { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            ///
            /// Surrounding whitespace is ignored.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                if trimmed.len() == id.len() {
                    Ok(Self(id))
                } else {
                    Ok(Self(trimmed.to_string()))
                }
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated user identifier.
    ///
    /// Owner IDs must be non-blank. Each owner has at most one tracker session,
    /// though uniqueness is enforced by the store.
    OwnerId, "owner ID"
);

define_string_id!(
    /// A validated time entry identifier.
    EntryId, "entry ID"
);

impl EntryId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Formats a number of seconds as `HH:MM:SS`.
///
/// Hours are not wrapped at 24.
#[must_use]
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Converts an unsigned counter to the signed width used for storage.
pub fn checked_i64(field: &'static str, value: u64) -> Result<i64, ValidationError> {
    i64::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        value: i128::from(value),
    })
}
