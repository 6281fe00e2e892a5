//! Fixed tool catalog exposed to the model
//!
//! Four tools: two context reads, one slot probe, one mutator. The
//! catalog is closed by construction; any other tool name the model
//! produces is answered with an `unknown_tool` observation.

use chrono::{NaiveDate, NaiveTime};
use serde_json::{Value, json};

use crate::error::ToolFault;
use crate::providers::ToolSpec;

pub const GET_BUSY_PERIODS: &str = "get_busy_periods";
pub const GET_CONFLICTING_SESSIONS: &str = "get_conflicting_sessions";
pub const CHECK_TIME_SLOT: &str = "check_time_slot";
pub const SCHEDULE_SESSION: &str = "schedule_session";

fn json_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Tool declarations sent with every provider request. Date and time
/// formats are spelled out in the descriptions; models follow them
/// reliably when they are explicit.
pub fn tool_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: GET_BUSY_PERIODS.to_string(),
            description: "Get per-day event counts for the student across the scheduling \
                          range, ordered least busy first. Days with no events are omitted, \
                          so any day absent from the listing is completely free. Call this \
                          before proposing any slots."
                .to_string(),
            input_schema: json_schema(json!({}), &[]),
        },
        ToolSpec {
            name: GET_CONFLICTING_SESSIONS.to_string(),
            description: "List the student's existing sessions for this subject within the \
                          scheduling range, ordered by date then start time. Use it to avoid \
                          repeating chapters and to space sessions out."
                .to_string(),
            input_schema: json_schema(json!({}), &[]),
        },
        ToolSpec {
            name: CHECK_TIME_SLOT.to_string(),
            description: "Check whether a specific slot is free of conflicts with any of the \
                          student's events. A slot must come back clean from this tool before \
                          it can be scheduled."
                .to_string(),
            input_schema: json_schema(
                json!({
                    "date": { "type": "string", "description": "Date, YYYY-MM-DD" },
                    "start_time": { "type": "string", "description": "Start time, HH:MM (24h)" },
                    "end_time": { "type": "string", "description": "End time, HH:MM (24h)" },
                }),
                &["date", "start_time", "end_time"],
            ),
        },
        ToolSpec {
            name: SCHEDULE_SESSION.to_string(),
            description: "Schedule one session at a slot that check_time_slot just reported \
                          clean. Fails if the slot was never checked, or if it was taken in \
                          the meantime."
                .to_string(),
            input_schema: json_schema(
                json!({
                    "date": { "type": "string", "description": "Date, YYYY-MM-DD" },
                    "start_time": { "type": "string", "description": "Start time, HH:MM (24h)" },
                    "end_time": { "type": "string", "description": "End time, HH:MM (24h)" },
                    "chapter": { "type": "string", "description": "Chapter this session covers" },
                }),
                &["date", "start_time", "end_time", "chapter"],
            ),
        },
    ]
}

/// A parsed date/time slot from tool arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotArgs {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Parsed arguments for `schedule_session`
#[derive(Debug, Clone)]
pub struct ScheduleArgs {
    pub slot: SlotArgs,
    pub chapter: String,
}

fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolFault> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolFault::Validation(format!("missing or non-string field '{field}'")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ToolFault> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ToolFault::Validation(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

// Accept both HH:MM and HH:MM:SS; models emit either
fn parse_time(raw: &str) -> Result<NaiveTime, ToolFault> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| ToolFault::Validation(format!("invalid time '{raw}', expected HH:MM")))
}

/// Parse and validate the slot fields shared by `check_time_slot` and
/// `schedule_session`
pub fn parse_slot_args(args: &Value) -> Result<SlotArgs, ToolFault> {
    let date = parse_date(require_str(args, "date")?)?;
    let start = parse_time(require_str(args, "start_time")?)?;
    let end = parse_time(require_str(args, "end_time")?)?;
    if start >= end {
        return Err(ToolFault::Validation(format!(
            "start time {start} is not before end time {end}",
            start = start.format("%H:%M"),
            end = end.format("%H:%M"),
        )));
    }
    Ok(SlotArgs { date, start, end })
}

pub fn parse_schedule_args(args: &Value) -> Result<ScheduleArgs, ToolFault> {
    let slot = parse_slot_args(args)?;
    let chapter = require_str(args, "chapter")?.trim().to_string();
    if chapter.is_empty() {
        return Err(ToolFault::Validation("chapter must not be empty".to_string()));
    }
    Ok(ScheduleArgs { slot, chapter })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_four_tools() {
        let catalog = tool_catalog();
        let names: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                GET_BUSY_PERIODS,
                GET_CONFLICTING_SESSIONS,
                CHECK_TIME_SLOT,
                SCHEDULE_SESSION
            ]
        );
    }

    #[test]
    fn test_busy_periods_description_explains_absent_days() {
        let catalog = tool_catalog();
        let busy = catalog.iter().find(|t| t.name == GET_BUSY_PERIODS).unwrap();
        assert!(busy.description.contains("omitted"));
        assert!(busy.description.contains("completely free"));
    }

    #[test]
    fn test_schedule_schema_requires_chapter() {
        let catalog = tool_catalog();
        let schedule = catalog.iter().find(|t| t.name == SCHEDULE_SESSION).unwrap();
        let required = schedule.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "chapter"));
    }

    #[test]
    fn test_parse_slot_args() {
        let args = json!({
            "date": "2026-09-07",
            "start_time": "10:00",
            "end_time": "11:00",
        });
        let slot = parse_slot_args(&args).unwrap();
        assert_eq!(slot.date, NaiveDate::from_ymd_opt(2026, 9, 7).unwrap());
        assert_eq!(slot.start, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_time_with_seconds() {
        let args = json!({
            "date": "2026-09-07",
            "start_time": "10:00:00",
            "end_time": "11:30:00",
        });
        assert!(parse_slot_args(&args).is_ok());
    }

    #[test]
    fn test_inverted_slot_rejected() {
        let args = json!({
            "date": "2026-09-07",
            "start_time": "11:00",
            "end_time": "10:00",
        });
        let err = parse_slot_args(&args).unwrap_err();
        assert!(matches!(err, ToolFault::Validation(_)));
    }

    #[test]
    fn test_missing_field_rejected() {
        let args = json!({ "date": "2026-09-07", "start_time": "10:00" });
        assert!(parse_slot_args(&args).is_err());
    }

    #[test]
    fn test_garbage_date_rejected() {
        let args = json!({
            "date": "next tuesday",
            "start_time": "10:00",
            "end_time": "11:00",
        });
        assert!(parse_slot_args(&args).is_err());
    }

    #[test]
    fn test_parse_schedule_args() {
        let args = json!({
            "date": "2026-09-07",
            "start_time": "10:00",
            "end_time": "11:00",
            "chapter": "quadratic equations",
        });
        let parsed = parse_schedule_args(&args).unwrap();
        assert_eq!(parsed.chapter, "quadratic equations");
    }

    #[test]
    fn test_blank_chapter_rejected() {
        let args = json!({
            "date": "2026-09-07",
            "start_time": "10:00",
            "end_time": "11:00",
            "chapter": "  ",
        });
        assert!(parse_schedule_args(&args).is_err());
    }
}
