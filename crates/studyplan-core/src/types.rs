//! Shared types for studyplan-core

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use studyplan_store::ScheduledSession;

/// Immutable input for one scheduling run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingRequest {
    pub student_id: String,
    pub subject: String,
    pub grade: String,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub preferred_days: Vec<Weekday>,
    pub preferred_times: Vec<TimeOfDay>,
    /// Chapters in the order they should be covered
    pub chapters: Vec<String>,
    pub target_session_count: u32,
    pub session_duration_minutes: u32,
}

impl SchedulingRequest {
    /// Reject malformed requests before any provider traffic
    pub fn validate(&self) -> Result<(), String> {
        if self.range_start > self.range_end {
            return Err(format!(
                "date range start {} is after end {}",
                self.range_start, self.range_end
            ));
        }
        if self.target_session_count < 1 {
            return Err("target session count must be at least 1".to_string());
        }
        if self.session_duration_minutes == 0 {
            return Err("session duration must be positive".to_string());
        }
        if self.subject.trim().is_empty() {
            return Err("subject must not be empty".to_string());
        }
        Ok(())
    }
}

/// Coarse time-of-day preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Morning => write!(f, "morning"),
            Self::Afternoon => write!(f, "afternoon"),
            Self::Evening => write!(f, "evening"),
        }
    }
}

/// Aggregated token accounting for a run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Actual tokens scaled by the cost ratio against the baseline model
    pub cost_adjusted_tokens: u64,
}

/// Result of one executor run. Partial placements are valid, durable
/// results; `completed` says whether the full target was reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub scheduled_sessions: Vec<ScheduledSession>,
    pub completed: bool,
    pub reasoning_steps: u32,
    pub token_usage: TokenTotals,
    pub cost_usd: f64,
}
