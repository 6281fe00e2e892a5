//! Incremental scheduling loop
//!
//! Drives a bounded multi-turn negotiation between one model and the
//! live calendar: the model proposes tool calls, the executor runs them
//! against [`CalendarSurface`] and feeds observations back, until the
//! model ends its turn, the iteration budget runs out, or the run is
//! cancelled. Sessions committed before any stop are durable; a run
//! that places some but not all sessions is a partial success, not a
//! failure.
//!
//! Commit safety is enforced twice. First by precedence: a
//! `schedule_session` is only dispatched when the exact slot came back
//! clean from `check_time_slot` earlier in the run and nothing has
//! invalidated that knowledge since. Second at the store, which
//! re-validates overlap inside the insert; losing that race surfaces as
//! a conflict observation, never a double-booking.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use studyplan_store::{NewSession, ScheduledSession, StoreError};

use crate::calendar::CalendarSurface;
use crate::context;
use crate::error::{SchedulingError, ToolFault};
use crate::pricing::{CostLedger, PricingTable};
use crate::providers::{AgentMessage, MessagePart, ModelProvider, TurnPart};
use crate::tools::{
    self, CHECK_TIME_SLOT, GET_BUSY_PERIODS, GET_CONFLICTING_SESSIONS, SCHEDULE_SESSION, SlotArgs,
};
use crate::types::{ScheduleOutcome, SchedulingRequest, TokenTotals};

/// Loop limits. The iteration budget counts reasoning turns, including
/// turns lost to provider timeouts and malformed responses.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_iterations: u32,
    pub provider_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            provider_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// One scheduling agent bound to a provider and a calendar
pub struct SessionScheduler {
    provider: Arc<dyn ModelProvider>,
    calendar: Arc<dyn CalendarSurface>,
    pricing: PricingTable,
    config: ExecutorConfig,
}

impl SessionScheduler {
    pub fn new(provider: Arc<dyn ModelProvider>, calendar: Arc<dyn CalendarSurface>) -> Self {
        Self {
            provider,
            calendar,
            pricing: PricingTable::default(),
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one scheduling request to completion, budget exhaustion, or
    /// cancellation. Cancellation is honored between turns; committed
    /// sessions always survive.
    pub async fn run(
        &self,
        request: &SchedulingRequest,
        cancel: &CancellationToken,
    ) -> Result<ScheduleOutcome, SchedulingError> {
        request.validate().map_err(SchedulingError::InvalidRequest)?;

        let system = context::build_system_prompt();
        let catalog = tools::tool_catalog();
        let mut conversation = vec![AgentMessage::user_text(context::build_opening_message(
            request,
        ))];

        let mut ledger = CostLedger::new();
        let mut placed: Vec<ScheduledSession> = Vec::new();
        // Slots whose most recent check_time_slot came back clean and
        // has not been invalidated by a later conflict or commit
        let mut clean_slots: HashSet<SlotArgs> = HashSet::new();
        let mut reasoning_steps = 0u32;

        info!(
            "Scheduling run started: student={}, subject={}, target={}, provider={}/{}",
            request.student_id,
            request.subject,
            request.target_session_count,
            self.provider.provider_name(),
            self.provider.model(),
        );

        while reasoning_steps < self.config.max_iterations {
            if cancel.is_cancelled() {
                info!(
                    "Scheduling run cancelled after {} turn(s), {} session(s) committed",
                    reasoning_steps,
                    placed.len()
                );
                break;
            }
            reasoning_steps += 1;

            let turn = match timeout(
                self.config.provider_timeout,
                self.provider.complete(&conversation, &catalog, &system),
            )
            .await
            {
                Err(_) => {
                    warn!("Provider call timed out on turn {}", reasoning_steps);
                    push_user_text(
                        &mut conversation,
                        "The previous request timed out. Continue from where you left off.",
                    );
                    continue;
                }
                Ok(Err(e)) => {
                    warn!("Provider turn {} failed: {:#}", reasoning_steps, e);
                    push_user_text(
                        &mut conversation,
                        format!(
                            "The previous response could not be processed ({e}). \
                             Continue from where you left off."
                        ),
                    );
                    continue;
                }
                Ok(Ok(turn)) => turn,
            };

            // Price the turn before acting on it; un-priceable is fatal
            let actual_cost = self.pricing.actual_cost(self.provider.model(), turn.usage)?;
            ledger.push(self.pricing.normalize(turn.usage, actual_cost)?);
            debug!(
                "Turn {} used {} token(s) (${:.6})",
                reasoning_steps,
                turn.usage.total(),
                actual_cost
            );

            conversation.push(AgentMessage::assistant_parts(
                turn.parts
                    .iter()
                    .map(|p| match p {
                        TurnPart::Text { text } => MessagePart::Text { text: text.clone() },
                        TurnPart::ToolCall { id, name, arguments } => MessagePart::ToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        },
                    })
                    .collect(),
            ));

            let calls: Vec<(String, String, Value)> = turn
                .tool_calls()
                .into_iter()
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.clone()))
                .collect();

            let target_reached = placed.len() as u32 >= request.target_session_count;
            if target_reached || calls.is_empty() {
                debug!(
                    "Run closing on turn {}: target_reached={}, tool_calls={}",
                    reasoning_steps,
                    target_reached,
                    calls.len()
                );
                let summary = turn.text();
                if !summary.is_empty() {
                    info!("Model closing note: {summary}");
                }
                break;
            }

            let mut observations = Vec::with_capacity(calls.len());
            for (id, name, args) in calls {
                let content = self
                    .dispatch(request, &name, &args, &mut placed, &mut clean_slots)
                    .await?;
                debug!("Tool {} -> {}", name, content);
                observations.push(MessagePart::ToolResult {
                    call_id: id,
                    name,
                    content,
                });
            }
            conversation.push(AgentMessage::user_parts(observations));
        }

        let completed = placed.len() as u32 >= request.target_session_count;
        if !completed {
            info!(
                "Run ended partial: {}/{} session(s) after {} turn(s)",
                placed.len(),
                request.target_session_count,
                reasoning_steps
            );
        } else {
            info!(
                "Run completed: {} session(s) in {} turn(s), ${:.6}, {} adjusted tokens",
                placed.len(),
                reasoning_steps,
                ledger.total_cost_usd(),
                ledger.total_adjusted_tokens()
            );
        }

        Ok(ScheduleOutcome {
            scheduled_sessions: placed,
            completed,
            reasoning_steps,
            token_usage: TokenTotals {
                prompt_tokens: ledger.total_prompt_tokens(),
                completion_tokens: ledger.total_completion_tokens(),
                total_tokens: ledger.total_actual_tokens(),
                cost_adjusted_tokens: ledger.total_adjusted_tokens(),
            },
            cost_usd: ledger.total_cost_usd(),
        })
    }

    /// Run one tool call. Recoverable faults come back as error
    /// observations; only store outages and pricing faults escape.
    async fn dispatch(
        &self,
        request: &SchedulingRequest,
        name: &str,
        args: &Value,
        placed: &mut Vec<ScheduledSession>,
        clean_slots: &mut HashSet<SlotArgs>,
    ) -> Result<String, SchedulingError> {
        match name {
            GET_BUSY_PERIODS => {
                let call = self.calendar.busy_periods(
                    &request.student_id,
                    request.range_start,
                    request.range_end,
                );
                match timeout(self.config.tool_timeout, call).await {
                    Err(_) => Ok(timeout_observation(name)),
                    Ok(Err(e)) => Err(SchedulingError::StoreUnavailable(format!("{e:#}"))),
                    Ok(Ok(periods)) => Ok(render(&periods)),
                }
            }

            GET_CONFLICTING_SESSIONS => {
                let call = self.calendar.sessions_for_subject(
                    &request.student_id,
                    &request.subject,
                    &request.grade,
                    request.range_start,
                    request.range_end,
                );
                match timeout(self.config.tool_timeout, call).await {
                    Err(_) => Ok(timeout_observation(name)),
                    Ok(Err(e)) => Err(SchedulingError::StoreUnavailable(format!("{e:#}"))),
                    Ok(Ok(sessions)) => Ok(render(&sessions)),
                }
            }

            CHECK_TIME_SLOT => {
                let slot = match tools::parse_slot_args(args) {
                    Ok(slot) => slot,
                    Err(fault) => return Ok(fault.observation()),
                };
                let call = self
                    .calendar
                    .check_slot(&request.student_id, slot.date, slot.start, slot.end);
                match timeout(self.config.tool_timeout, call).await {
                    Err(_) => Ok(timeout_observation(name)),
                    Ok(Err(e)) => Err(SchedulingError::StoreUnavailable(format!("{e:#}"))),
                    Ok(Ok(check)) => {
                        if check.has_conflict {
                            clean_slots.remove(&slot);
                        } else {
                            clean_slots.insert(slot);
                        }
                        Ok(render(&check))
                    }
                }
            }

            SCHEDULE_SESSION => {
                // One turn can carry more schedule calls than sessions
                // remain; the excess must never reach the store
                if placed.len() as u32 >= request.target_session_count {
                    warn!(
                        "schedule_session past the target of {}, not committing",
                        request.target_session_count
                    );
                    return Ok(target_reached_observation(request.target_session_count));
                }
                let parsed = match tools::parse_schedule_args(args) {
                    Ok(parsed) => parsed,
                    Err(fault) => return Ok(fault.observation()),
                };
                match self
                    .commit_session(request, parsed.slot, parsed.chapter, clean_slots)
                    .await?
                {
                    Ok(session) => {
                        let obs = render(&session);
                        placed.push(session);
                        Ok(obs)
                    }
                    Err(fault) => {
                        warn!("schedule_session rejected: {}", fault);
                        Ok(fault.observation())
                    }
                }
            }

            other => {
                warn!("Model requested unknown tool '{}'", other);
                Ok(ToolFault::UnknownTool(other.to_string()).observation())
            }
        }
    }

    /// Validate, enforce precedence, and commit one session. The inner
    /// `Result` is the recoverable tier.
    async fn commit_session(
        &self,
        request: &SchedulingRequest,
        slot: SlotArgs,
        chapter: String,
        clean_slots: &mut HashSet<SlotArgs>,
    ) -> Result<Result<ScheduledSession, ToolFault>, SchedulingError> {
        if slot.date < request.range_start || slot.date > request.range_end {
            return Ok(Err(ToolFault::Validation(format!(
                "date {} is outside the scheduling range {} to {}",
                slot.date, request.range_start, request.range_end
            ))));
        }

        let minutes = (slot.end - slot.start).num_minutes();
        if minutes != i64::from(request.session_duration_minutes) {
            return Ok(Err(ToolFault::Validation(format!(
                "slot is {} minutes long, sessions must be {} minutes",
                minutes, request.session_duration_minutes
            ))));
        }

        if !clean_slots.contains(&slot) {
            return Ok(Err(ToolFault::Precedence(format!(
                "slot {} {}-{} has no preceding clean check_time_slot; check it first",
                slot.date,
                slot.start.format("%H:%M"),
                slot.end.format("%H:%M"),
            ))));
        }

        let new = NewSession {
            student_id: request.student_id.clone(),
            subject: request.subject.clone(),
            grade: request.grade.clone(),
            date: slot.date,
            start_time: slot.start,
            end_time: slot.end,
            chapter,
        };

        match timeout(self.config.tool_timeout, self.calendar.schedule(new)).await {
            Err(_) => {
                // The commit may or may not have landed; treat the
                // slot as unknown until re-checked
                clean_slots.remove(&slot);
                Ok(Err(ToolFault::Conflict(format!(
                    "scheduling timed out for {} {}-{}; re-check the slot before retrying",
                    slot.date,
                    slot.start.format("%H:%M"),
                    slot.end.format("%H:%M"),
                ))))
            }
            Ok(Err(StoreError::SlotTaken { conflicting })) => {
                // Lost the race since the clean check
                clean_slots.remove(&slot);
                Ok(Err(ToolFault::Conflict(format!(
                    "slot was taken after the last check: {} session on {} {}-{}",
                    conflicting.subject,
                    conflicting.date,
                    conflicting.start_time.format("%H:%M"),
                    conflicting.end_time.format("%H:%M"),
                ))))
            }
            Ok(Err(e)) => Err(SchedulingError::StoreUnavailable(e.to_string())),
            Ok(Ok(session)) => {
                // A committed slot is occupied now; require a fresh
                // check before it could be scheduled again
                clean_slots.remove(&slot);
                Ok(Ok(session))
            }
        }
    }
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn timeout_observation(tool: &str) -> String {
    serde_json::json!({
        "error": "tool_timeout",
        "message": format!("{tool} did not answer in time; try again"),
    })
    .to_string()
}

fn target_reached_observation(target: u32) -> String {
    serde_json::json!({
        "error": "target_reached",
        "message": format!("all {target} requested session(s) are already scheduled; stop scheduling"),
    })
    .to_string()
}

// Some providers reject consecutive same-role messages, so retry
// nudges merge into a trailing user message when there is one.
fn push_user_text(conversation: &mut Vec<AgentMessage>, text: impl Into<String>) {
    let text = text.into();
    match conversation.last_mut() {
        Some(last) if last.role == crate::providers::MessageRole::User => {
            last.parts.push(MessagePart::Text { text });
        }
        _ => conversation.push(AgentMessage::user_text(text)),
    }
}
