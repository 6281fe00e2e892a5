//! Scheduling mode selection
//!
//! Below the threshold the caller can afford to inline the whole
//! calendar into a single prompt; above it the incremental agent loop
//! queries the calendar through tools instead.

/// Default event count at which the agent loop takes over
pub const DEFAULT_AGENT_MODE_THRESHOLD: u32 = 50;

/// True when the student's calendar is busy enough that the agent loop
/// should be used instead of a single bulk prompt
pub fn should_use_agent_mode(existing_event_count: u32, threshold: u32) -> bool {
    existing_event_count >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_stays_bulk() {
        assert!(!should_use_agent_mode(0, DEFAULT_AGENT_MODE_THRESHOLD));
        assert!(!should_use_agent_mode(49, DEFAULT_AGENT_MODE_THRESHOLD));
    }

    #[test]
    fn test_at_and_above_threshold_uses_agent() {
        assert!(should_use_agent_mode(50, DEFAULT_AGENT_MODE_THRESHOLD));
        assert!(should_use_agent_mode(500, DEFAULT_AGENT_MODE_THRESHOLD));
    }

    #[test]
    fn test_custom_threshold() {
        assert!(should_use_agent_mode(10, 10));
        assert!(!should_use_agent_mode(9, 10));
    }
}
