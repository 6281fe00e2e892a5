//! Error taxonomy for the scheduling agent
//!
//! Two tiers: [`ToolFault`] covers recoverable tool-dispatch failures
//! that are rendered back to the model as observations and retried by
//! it, while [`SchedulingError`] covers fatal conditions that stop the
//! run and escape to the caller.

use thiserror::Error;

use crate::pricing::PricingError;

/// Recoverable failure while dispatching a single tool call. Never
/// thrown past the executor: each variant becomes a structured error
/// observation in the conversation.
#[derive(Debug, Error)]
pub enum ToolFault {
    /// Malformed or out-of-range tool arguments
    #[error("validation error: {0}")]
    Validation(String),

    /// The slot was occupied at commit time (lost a race since the
    /// last clean check)
    #[error("conflict error: {0}")]
    Conflict(String),

    /// schedule_session without a preceding clean check_time_slot for
    /// the exact same slot
    #[error("precedence error: {0}")]
    Precedence(String),

    /// The model asked for a tool outside the fixed catalog
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolFault {
    /// Render into the observation payload the model sees
    pub fn observation(&self) -> String {
        let code = match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict_error",
            Self::Precedence(_) => "precedence_error",
            Self::UnknownTool(_) => "unknown_tool",
        };
        serde_json::json!({ "error": code, "message": self.to_string() }).to_string()
    }
}

/// Fatal run failure. Recoverable conditions (provider timeouts,
/// malformed turns, slot conflicts) are resolved inside the loop and
/// never appear here.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// The request itself was malformed; rejected before any turn
    #[error("invalid scheduling request: {0}")]
    InvalidRequest(String),

    /// The calendar store could not be queried at all
    #[error("calendar store unavailable: {0}")]
    StoreUnavailable(String),

    /// A turn could not be priced; an un-priceable turn cannot be
    /// safely billed, so the run stops
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_fault_observation_shape() {
        let fault = ToolFault::Precedence("slot 2026-09-07 10:00-11:00 was not checked".to_string());
        let obs: serde_json::Value = serde_json::from_str(&fault.observation()).unwrap();
        assert_eq!(obs["error"], "precedence_error");
        assert!(obs["message"].as_str().unwrap().contains("10:00-11:00"));
    }

    #[test]
    fn test_tool_fault_codes() {
        let cases = [
            (ToolFault::Validation("x".into()), "validation_error"),
            (ToolFault::Conflict("x".into()), "conflict_error"),
            (ToolFault::Precedence("x".into()), "precedence_error"),
            (ToolFault::UnknownTool("x".into()), "unknown_tool"),
        ];
        for (fault, code) in cases {
            let obs: serde_json::Value = serde_json::from_str(&fault.observation()).unwrap();
            assert_eq!(obs["error"], code);
        }
    }

    #[test]
    fn test_scheduling_error_display() {
        let err = SchedulingError::StoreUnavailable("disk full".to_string());
        assert!(err.to_string().contains("disk full"));
    }
}
