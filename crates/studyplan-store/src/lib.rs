//! studyplan-store - durable calendar event store
//!
//! SQLite-backed persistence for scheduled study sessions. Exposes the
//! read surface the scheduling agent queries incrementally (busy-period
//! ranking, same-subject lookup, point-in-time conflict checks) and the
//! single mutator, a commit-time re-validated session insert.

pub mod sqlite;

pub use sqlite::{
    BusyPeriodSummary, ConflictCheck, EventStore, NewSession, ScheduledSession, SessionStatus,
    SessionSummary, StoreError,
};
