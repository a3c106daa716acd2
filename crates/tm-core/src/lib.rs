//! Core domain logic for trackme.
//!
//! This crate contains:
//! - The per-owner tracker session state machine (start/pause/resume/reset)
//! - Booking tracked time into time entries, and manual entry management
//! - The [`Store`] persistence boundary and an in-memory implementation
//! - [`TrackerService`], which serializes read-modify-write cycles per owner

mod booking;
pub mod clock;
pub mod entry;
pub mod memory;
mod service;
pub mod store;
pub mod tracker;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{EntryDraft, TimeEntry};
pub use memory::MemoryStore;
pub use service::{ActionOutcome, DEFAULT_MAX_ATTEMPTS, TrackerError, TrackerService};
pub use store::{Store, StoreError, Versioned};
pub use tracker::{Action, TrackerRecord, TrackerSession, TrackerState, TrackerStatus, Transition};
pub use types::{EntryId, Metadata, OwnerId, ValidationError, checked_i64, format_hms};
