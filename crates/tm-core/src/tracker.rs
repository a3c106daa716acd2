//! The per-owner tracker session and its state machine.
//!
//! A tracker is in exactly one of three states:
//!
//! - [`TrackerState::Idle`]: never started, or reset. Observably the same as
//!   paused with zero accumulated time.
//! - [`TrackerState::Running`]: accumulating time since `started_at`.
//! - [`TrackerState::Paused`]: the last segment was banked into
//!   `accumulated_seconds` at `paused_at`.
//!
//! Every transition takes the current instant as an argument; nothing here
//! reads the clock on its own.
//!
//! Segments are floored at zero: if the clock moves backwards, a segment
//! whose end precedes its start contributes nothing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OwnerId, ValidationError, checked_i64, format_hms};

/// The tagged state of a tracker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackerState {
    /// Not accumulating. `since` is the last reset, if there ever was one.
    Idle { since: Option<DateTime<Utc>> },
    Running {
        started_at: DateTime<Utc>,
    },
    Paused {
        started_at: DateTime<Utc>,
        paused_at: DateTime<Utc>,
    },
}

impl TrackerState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "idle",
            Self::Running { .. } => "running",
            Self::Paused { .. } => "paused",
        }
    }
}

/// A tracker action requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Pause,
    Resume,
    Reset,
}

impl Action {
    pub const ALL: [Self; 4] = [Self::Start, Self::Pause, Self::Resume, Self::Reset];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "reset" => Ok(Self::Reset),
            _ => Err(ValidationError::UnknownAction {
                value: s.to_string(),
            }),
        }
    }
}

/// The result of applying an [`Action`].
///
/// No-op variants are successful outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Started,
    Paused,
    Resumed,
    Reset,
    AlreadyRunning,
    AlreadyPaused,
}

impl Transition {
    /// Whether the session was modified.
    pub const fn changed(self) -> bool {
        !matches!(self, Self::AlreadyRunning | Self::AlreadyPaused)
    }

    /// Human-readable message for the caller.
    pub const fn message(self) -> &'static str {
        match self {
            Self::Started => "Tracker started",
            Self::Paused => "Tracker paused",
            Self::Resumed => "Tracker resumed",
            Self::Reset => "Tracker reset",
            Self::AlreadyRunning => "Tracker already running",
            Self::AlreadyPaused => "Tracker already paused",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Flat persisted form of a tracker session.
///
/// This is what storage backends read and write. Converting it into a
/// [`TrackerSession`] validates every invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRecord {
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub accumulated_seconds: i64,
    pub is_running: bool,
}

/// One owner's persisted timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSession {
    owner: OwnerId,
    state: TrackerState,
    accumulated_seconds: u64,
}

impl TrackerSession {
    /// A never-started tracker with nothing accumulated.
    pub const fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            state: TrackerState::Idle { since: None },
            accumulated_seconds: 0,
        }
    }

    /// Builds a session from its persisted fields, validating invariants.
    pub fn from_record(owner: OwnerId, record: TrackerRecord) -> Result<Self, ValidationError> {
        let accumulated_seconds = u64::try_from(record.accumulated_seconds).map_err(|_| {
            ValidationError::NegativeAccumulated {
                seconds: record.accumulated_seconds,
            }
        })?;

        let state = match (record.is_running, record.started_at, record.paused_at) {
            (true, _, Some(_)) => return Err(ValidationError::PausedWhileRunning),
            (true, None, None) => return Err(ValidationError::MissingStart { state: "running" }),
            (true, Some(started_at), None) => TrackerState::Running { started_at },
            (false, None, Some(_)) => return Err(ValidationError::MissingStart { state: "paused" }),
            (false, Some(started_at), Some(paused_at)) => {
                if paused_at < started_at {
                    return Err(ValidationError::PauseBeforeStart {
                        started_at,
                        paused_at,
                    });
                }
                TrackerState::Paused {
                    started_at,
                    paused_at,
                }
            }
            (false, since, None) => TrackerState::Idle { since },
        };

        Ok(Self {
            owner,
            state,
            accumulated_seconds,
        })
    }

    /// Flattens the session into its persisted fields.
    pub fn to_record(&self) -> Result<TrackerRecord, ValidationError> {
        Ok(TrackerRecord {
            started_at: self.started_at(),
            paused_at: self.paused_at(),
            accumulated_seconds: checked_i64("accumulated_seconds", self.accumulated_seconds)?,
            is_running: self.is_running(),
        })
    }

    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub const fn state(&self) -> TrackerState {
        self.state
    }

    /// Seconds banked from closed segments, excluding the current one.
    pub const fn accumulated_seconds(&self) -> u64 {
        self.accumulated_seconds
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.state, TrackerState::Running { .. })
    }

    /// Start of the current segment chain (or the last reset when idle).
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            TrackerState::Idle { since } => since,
            TrackerState::Running { started_at } | TrackerState::Paused { started_at, .. } => {
                Some(started_at)
            }
        }
    }

    pub const fn paused_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            TrackerState::Paused { paused_at, .. } => Some(paused_at),
            TrackerState::Idle { .. } | TrackerState::Running { .. } => None,
        }
    }

    /// Total tracked seconds as of `now`: banked time plus the running segment.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        let running = match self.state {
            TrackerState::Running { started_at } => segment_seconds(started_at, now),
            TrackerState::Idle { .. } | TrackerState::Paused { .. } => 0,
        };
        self.accumulated_seconds.saturating_add(running)
    }

    /// Applies `action` at `now`.
    pub fn apply(&mut self, action: Action, now: DateTime<Utc>) -> Transition {
        match action {
            Action::Start => self.start(now),
            Action::Pause => self.pause(now),
            Action::Resume => self.resume(now),
            Action::Reset => self.reset(now),
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_running() {
            return Transition::AlreadyRunning;
        }
        self.state = TrackerState::Running { started_at: now };
        Transition::Started
    }

    /// Banks the running segment and pauses.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Transition {
        let TrackerState::Running { started_at } = self.state else {
            return Transition::AlreadyPaused;
        };

        let paused_at = if now < started_at {
            tracing::warn!(
                owner = %self.owner,
                %started_at,
                %now,
                "clock moved backwards while running; banking an empty segment"
            );
            started_at
        } else {
            now
        };

        self.accumulated_seconds = self
            .accumulated_seconds
            .saturating_add(segment_seconds(started_at, paused_at));
        self.state = TrackerState::Paused {
            started_at,
            paused_at,
        };
        Transition::Paused
    }

    /// Begins a new segment, keeping banked time.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_running() {
            return Transition::AlreadyRunning;
        }
        self.state = TrackerState::Running { started_at: now };
        Transition::Resumed
    }

    /// Zeroes the tracker and stops it. Always succeeds.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Transition {
        self.state = TrackerState::Idle { since: Some(now) };
        self.accumulated_seconds = 0;
        Transition::Reset
    }

    /// A read-only snapshot for callers.
    pub fn status(&self, now: DateTime<Utc>) -> TrackerStatus {
        let elapsed = self.elapsed_seconds(now);
        TrackerStatus {
            state: self.state.as_str(),
            is_running: self.is_running(),
            current_elapsed_seconds: elapsed,
            accumulated_seconds: self.accumulated_seconds,
            started_at: self.started_at(),
            paused_at: self.paused_at(),
            elapsed_display: format_hms(elapsed),
        }
    }
}

/// Whole seconds from `start` to `end`, floored, never negative.
fn segment_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_seconds()).unwrap_or(0)
}

/// What `get_status` reports to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    pub state: &'static str,
    pub is_running: bool,
    pub current_elapsed_seconds: u64,
    pub accumulated_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub elapsed_display: String,
}
