//! Calendar query surface
//!
//! The one shared, externally-mutable resource the agent negotiates
//! against. Reads are idempotent; the single mutator re-validates at
//! commit time (see `studyplan_store::EventStore::insert_session`).
//! The executor depends on this trait so tests can script the
//! calendar the same way they script the model.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

use studyplan_store::{
    BusyPeriodSummary, ConflictCheck, EventStore, NewSession, ScheduledSession, SessionSummary,
    StoreError,
};

#[async_trait]
pub trait CalendarSurface: Send + Sync {
    /// Per-day event counts, ascending by count (least busy first)
    async fn busy_periods(
        &self,
        student_id: &str,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Vec<BusyPeriodSummary>>;

    /// Existing same-subject sessions in the range, by date then start
    async fn sessions_for_subject(
        &self,
        student_id: &str,
        subject: &str,
        grade: &str,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Vec<SessionSummary>>;

    /// Overlap test against all of the student's events on that date
    async fn check_slot(
        &self,
        student_id: &str,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<ConflictCheck>;

    /// Commit a session, re-validating for overlap
    async fn schedule(
        &self,
        new: NewSession,
    ) -> std::result::Result<ScheduledSession, StoreError>;
}

#[async_trait]
impl CalendarSurface for EventStore {
    async fn busy_periods(
        &self,
        student_id: &str,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Vec<BusyPeriodSummary>> {
        EventStore::busy_periods(self, student_id, range_start, range_end).await
    }

    async fn sessions_for_subject(
        &self,
        student_id: &str,
        subject: &str,
        grade: &str,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Vec<SessionSummary>> {
        EventStore::sessions_for_subject(self, student_id, subject, grade, range_start, range_end)
            .await
    }

    async fn check_slot(
        &self,
        student_id: &str,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<ConflictCheck> {
        EventStore::check_slot(self, student_id, date, start, end).await
    }

    async fn schedule(
        &self,
        new: NewSession,
    ) -> std::result::Result<ScheduledSession, StoreError> {
        EventStore::insert_session(self, new).await
    }
}
