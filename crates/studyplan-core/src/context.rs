//! Prompt construction for scheduling runs

use crate::types::SchedulingRequest;

/// System prompt sent with every turn. Workflow rules mirror what the
/// executor enforces mechanically, so the model rarely hits a
/// precedence rejection in practice.
pub fn build_system_prompt() -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a study-session scheduling assistant. You place tutoring sessions \
         on a student's calendar using the tools provided, without double-booking.\n\n",
    );

    prompt.push_str("## Workflow\n\n");
    prompt.push_str(
        "1. Call get_busy_periods and get_conflicting_sessions first to learn the \
         calendar before proposing anything.\n\
         2. Pick candidate slots on the least busy days, favoring the student's \
         preferred days and times of day when possible. Days missing from the \
         get_busy_periods listing have no events at all.\n\
         3. Verify every candidate with check_time_slot. Only a slot that came back \
         clean may be scheduled, and it must be scheduled with exactly the same date \
         and times that were checked.\n\
         4. If check_time_slot reports a conflict, or schedule_session fails because \
         the slot was taken, pick a different slot and check it. Never retry the \
         same slot without a fresh clean check.\n\
         5. Assign chapters in the given order, one per session, cycling back to the \
         start if there are more sessions than chapters.\n\
         6. Once every requested session is scheduled, reply with a short summary \
         and stop calling tools.\n\n",
    );

    prompt.push_str("## Rules\n\n");
    prompt.push_str(
        "- Every session stays within the given date range.\n\
         - Sessions last exactly the requested duration.\n\
         - Spread sessions across different days; avoid stacking several on one day \
         unless the range leaves no choice.\n\
         - Dates are YYYY-MM-DD; times are 24-hour HH:MM.\n",
    );

    prompt
}

/// Opening user message carrying the concrete request
pub fn build_opening_message(request: &SchedulingRequest) -> String {
    let mut msg = String::new();

    msg.push_str(&format!(
        "Schedule {count} {subject} session(s) of {duration} minutes each for \
         student {student} (grade {grade}).\n\n",
        count = request.target_session_count,
        subject = request.subject,
        duration = request.session_duration_minutes,
        student = request.student_id,
        grade = request.grade,
    ));

    msg.push_str(&format!(
        "Date range: {} to {} (inclusive).\n",
        request.range_start, request.range_end
    ));

    if !request.preferred_days.is_empty() {
        let days: Vec<String> = request.preferred_days.iter().map(|d| d.to_string()).collect();
        msg.push_str(&format!("Preferred days: {}.\n", days.join(", ")));
    }
    if !request.preferred_times.is_empty() {
        let times: Vec<String> = request.preferred_times.iter().map(|t| t.to_string()).collect();
        msg.push_str(&format!("Preferred times of day: {}.\n", times.join(", ")));
    }

    if !request.chapters.is_empty() {
        msg.push_str("\nChapters to cover, in order:\n");
        for (i, chapter) in request.chapters.iter().enumerate() {
            msg.push_str(&format!("{}. {}\n", i + 1, chapter));
        }
    }

    msg.push_str("\nStart by reading the calendar.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeOfDay;
    use chrono::{NaiveDate, Weekday};

    fn request() -> SchedulingRequest {
        SchedulingRequest {
            student_id: "student-7".to_string(),
            subject: "physics".to_string(),
            grade: "11".to_string(),
            range_start: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            range_end: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            preferred_days: vec![Weekday::Tue, Weekday::Thu],
            preferred_times: vec![TimeOfDay::Evening],
            chapters: vec!["kinematics".to_string(), "dynamics".to_string()],
            target_session_count: 4,
            session_duration_minutes: 90,
        }
    }

    #[test]
    fn test_system_prompt_names_all_tools() {
        let prompt = build_system_prompt();
        for tool in [
            "get_busy_periods",
            "get_conflicting_sessions",
            "check_time_slot",
            "schedule_session",
        ] {
            assert!(prompt.contains(tool), "missing {tool}");
        }
    }

    #[test]
    fn test_opening_message_carries_request() {
        let msg = build_opening_message(&request());
        assert!(msg.contains("4 physics session(s)"));
        assert!(msg.contains("90 minutes"));
        assert!(msg.contains("student-7"));
        assert!(msg.contains("2026-09-01 to 2026-09-30"));
        assert!(msg.contains("Tue, Thu"));
        assert!(msg.contains("evening"));
        assert!(msg.contains("1. kinematics"));
    }

    #[test]
    fn test_opening_message_omits_empty_preferences() {
        let mut req = request();
        req.preferred_days.clear();
        req.preferred_times.clear();
        let msg = build_opening_message(&req);
        assert!(!msg.contains("Preferred days"));
        assert!(!msg.contains("Preferred times"));
    }
}
