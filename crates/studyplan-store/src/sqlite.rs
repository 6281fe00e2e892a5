//! SQLite database layer for the session calendar

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";

/// A committed study session row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSession {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    pub grade: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub chapter: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a session row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl SessionStatus {
    fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            _ => Self::Scheduled,
        }
    }
}

/// Input for a new session insert
#[derive(Debug, Clone)]
pub struct NewSession {
    pub student_id: String,
    pub subject: String,
    pub grade: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub chapter: String,
}

/// Per-day event count within a queried range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyPeriodSummary {
    pub date: NaiveDate,
    pub event_count: u32,
}

/// Compact view of an existing session, as reported to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub subject: String,
    pub chapter: String,
}

/// Result of a point-in-time slot check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheck {
    pub has_conflict: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_session: Option<SessionSummary>,
}

/// Store-level failures. `SlotTaken` is the one recoverable case: the
/// slot was clean when checked but occupied by the time of the insert.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("slot already taken by {subject} session on {date} {start}-{end}",
        subject = .conflicting.subject,
        date = .conflicting.date,
        start = .conflicting.start_time.format(TIME_FMT),
        end = .conflicting.end_time.format(TIME_FMT))]
    SlotTaken { conflicting: SessionSummary },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    Internal(String),
}

/// SQLite event store (thread-safe via Arc<Mutex>)
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    /// Open (or create) the database and initialize the schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn =
            Connection::open(path.as_ref()).context("Failed to open SQLite session store")?;
        info!("Initializing session store at {:?}", path.as_ref());
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests and the CLI dry-run path
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                grade TEXT NOT NULL,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                chapter TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_student_date
             ON sessions(student_id, date)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_subject
             ON sessions(student_id, subject, grade)",
            [],
        )?;
        debug!("Session store schema initialized");
        Ok(())
    }

    /// Per-day event counts for a student in the range, ascending by
    /// count. Ties break chronologically so results are deterministic.
    /// Counts every event regardless of subject: the ranking exists to
    /// bias placement toward lighter days.
    pub async fn busy_periods(
        &self,
        student_id: &str,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Vec<BusyPeriodSummary>> {
        let conn = Arc::clone(&self.conn);
        let student_id = student_id.to_owned();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            let mut stmt = conn.prepare(
                "SELECT date, COUNT(*) FROM sessions
                 WHERE student_id = ?1 AND date >= ?2 AND date <= ?3
                   AND status = 'scheduled'
                 GROUP BY date
                 ORDER BY COUNT(*) ASC, date ASC",
            )?;

            let summaries = stmt
                .query_map(
                    params![
                        &student_id,
                        range_start.format(DATE_FMT).to_string(),
                        range_end.format(DATE_FMT).to_string(),
                    ],
                    |row| {
                        let date_str: String = row.get(0)?;
                        Ok(BusyPeriodSummary {
                            date: parse_date(&date_str, 0)?,
                            event_count: row.get(1)?,
                        })
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;

            debug!(
                "Busy periods for {}: {} days with events",
                student_id,
                summaries.len()
            );
            Ok(summaries)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Existing sessions for the same subject and grade in the range,
    /// ordered by date then start time
    pub async fn sessions_for_subject(
        &self,
        student_id: &str,
        subject: &str,
        grade: &str,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Vec<SessionSummary>> {
        let conn = Arc::clone(&self.conn);
        let student_id = student_id.to_owned();
        let subject = subject.to_owned();
        let grade = grade.to_owned();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            let mut stmt = conn.prepare(
                "SELECT date, start_time, end_time, subject, chapter FROM sessions
                 WHERE student_id = ?1 AND subject = ?2 AND grade = ?3
                   AND date >= ?4 AND date <= ?5 AND status = 'scheduled'
                 ORDER BY date ASC, start_time ASC",
            )?;

            let sessions = stmt
                .query_map(
                    params![
                        &student_id,
                        &subject,
                        &grade,
                        range_start.format(DATE_FMT).to_string(),
                        range_end.format(DATE_FMT).to_string(),
                    ],
                    row_to_summary,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(sessions)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Check a candidate slot against all of the student's events on
    /// that date. Two intervals [s1,e1) and [s2,e2) conflict iff
    /// s1 < e2 && s2 < e1.
    pub async fn check_slot(
        &self,
        student_id: &str,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<ConflictCheck> {
        let conn = Arc::clone(&self.conn);
        let student_id = student_id.to_owned();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            let conflicting = find_overlap(&conn, &student_id, date, start, end)?;
            Ok(ConflictCheck {
                has_conflict: conflicting.is_some(),
                conflicting_session: conflicting,
            })
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Insert a session, re-validating for overlap at commit time.
    ///
    /// The overlap check and the insert run under the same connection
    /// lock, so a clean check here cannot be invalidated by a
    /// concurrent run before the row lands. A race that occupied the
    /// slot since the agent's earlier `check_slot` surfaces as
    /// [`StoreError::SlotTaken`].
    pub async fn insert_session(
        &self,
        new: NewSession,
    ) -> std::result::Result<ScheduledSession, StoreError> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);

            if let Some(conflicting) =
                find_overlap(&conn, &new.student_id, new.date, new.start_time, new.end_time)?
            {
                warn!(
                    "Commit-time conflict for {} on {} {}-{}",
                    new.student_id,
                    new.date,
                    new.start_time.format(TIME_FMT),
                    new.end_time.format(TIME_FMT)
                );
                return Err(StoreError::SlotTaken { conflicting });
            }

            let session = ScheduledSession {
                id: Uuid::new_v4().to_string(),
                student_id: new.student_id,
                subject: new.subject,
                grade: new.grade,
                date: new.date,
                start_time: new.start_time,
                end_time: new.end_time,
                chapter: new.chapter,
                status: SessionStatus::Scheduled,
                created_at: Utc::now(),
            };

            conn.execute(
                "INSERT INTO sessions
                 (id, student_id, subject, grade, date, start_time, end_time, chapter, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    &session.id,
                    &session.student_id,
                    &session.subject,
                    &session.grade,
                    session.date.format(DATE_FMT).to_string(),
                    session.start_time.format(TIME_FMT).to_string(),
                    session.end_time.format(TIME_FMT).to_string(),
                    &session.chapter,
                    session.status.to_string(),
                    session.created_at.to_rfc3339(),
                ],
            )?;

            debug!(
                "Committed session {} ({} {} {}-{})",
                session.id,
                session.subject,
                session.date,
                session.start_time.format(TIME_FMT),
                session.end_time.format(TIME_FMT)
            );
            Ok(session)
        })
        .await
        .map_err(|e| StoreError::Internal(e.to_string()))?
    }

    /// Count scheduled events for a student in a date range. Consumed
    /// by the mode selector to decide between agent and bulk paths.
    pub async fn count_sessions(
        &self,
        student_id: &str,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<u32> {
        let conn = Arc::clone(&self.conn);
        let student_id = student_id.to_owned();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            let count: u32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sessions
                     WHERE student_id = ?1 AND date >= ?2 AND date <= ?3
                       AND status = 'scheduled'",
                    params![
                        &student_id,
                        range_start.format(DATE_FMT).to_string(),
                        range_end.format(DATE_FMT).to_string(),
                    ],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            Ok(count)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Fetch a session by id
    pub async fn get_session(&self, id: &str) -> Result<Option<ScheduledSession>> {
        let conn = Arc::clone(&self.conn);
        let id = id.to_owned();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            let session = conn
                .query_row(
                    "SELECT id, student_id, subject, grade, date, start_time, end_time,
                            chapter, status, created_at
                     FROM sessions WHERE id = ?1",
                    params![&id],
                    row_to_session,
                )
                .optional()?;
            Ok(session)
        })
        .await
        .context("spawn_blocking task panicked")?
    }
}

fn lock(conn: &Arc<Mutex<Connection>>) -> std::sync::MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| {
        warn!("Store mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn find_overlap(
    conn: &Connection,
    student_id: &str,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> std::result::Result<Option<SessionSummary>, rusqlite::Error> {
    // HH:MM strings compare correctly as text
    conn.query_row(
        "SELECT date, start_time, end_time, subject, chapter FROM sessions
         WHERE student_id = ?1 AND date = ?2 AND status = 'scheduled'
           AND start_time < ?4 AND end_time > ?3
         ORDER BY start_time ASC
         LIMIT 1",
        params![
            student_id,
            date.format(DATE_FMT).to_string(),
            start.format(TIME_FMT).to_string(),
            end.format(TIME_FMT).to_string(),
        ],
        row_to_summary,
    )
    .optional()
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> std::result::Result<SessionSummary, rusqlite::Error> {
    let date_str: String = row.get(0)?;
    let start_str: String = row.get(1)?;
    let end_str: String = row.get(2)?;
    Ok(SessionSummary {
        date: parse_date(&date_str, 0)?,
        start_time: parse_time(&start_str, 1)?,
        end_time: parse_time(&end_str, 2)?,
        subject: row.get(3)?,
        chapter: row.get(4)?,
    })
}

fn row_to_session(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<ScheduledSession, rusqlite::Error> {
    let date_str: String = row.get(4)?;
    let start_str: String = row.get(5)?;
    let end_str: String = row.get(6)?;
    let status_str: String = row.get(8)?;
    Ok(ScheduledSession {
        id: row.get(0)?,
        student_id: row.get(1)?,
        subject: row.get(2)?,
        grade: row.get(3)?,
        date: parse_date(&date_str, 4)?,
        start_time: parse_time(&start_str, 5)?,
        end_time: parse_time(&end_str, 6)?,
        chapter: row.get(7)?,
        status: SessionStatus::parse(&status_str),
        created_at: row
            .get::<_, String>(9)?
            .parse()
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn parse_date(s: &str, col: usize) -> std::result::Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_time(s: &str, col: usize) -> std::result::Result<NaiveTime, rusqlite::Error> {
    NaiveTime::parse_from_str(s, TIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}
