//! studyplan-core: incremental, conflict-aware study-session scheduling
//!
//! An agent loop that places tutoring sessions on a live calendar by
//! negotiating with an LLM through a fixed four-tool catalog. The model
//! reads the calendar, probes candidate slots, and commits sessions one
//! at a time; the executor enforces check-before-schedule precedence
//! and the store re-validates every commit, so stale model knowledge
//! can never double-book.
//!
//! Crate layout:
//! - [`providers`]: Anthropic, Gemini, and OpenAI adapters behind one
//!   [`providers::ModelProvider`] trait
//! - [`executor`]: the bounded reasoning/dispatch loop
//! - [`tools`]: the tool catalog and argument parsing
//! - [`pricing`]: cost normalization against a baseline model
//! - [`calendar`]: the store-facing query surface
//! - [`mode`]: bulk-prompt vs agent-loop selection

pub mod calendar;
pub mod context;
pub mod error;
pub mod executor;
pub mod mode;
pub mod pricing;
pub mod providers;
pub mod tools;
pub mod types;

pub use calendar::CalendarSurface;
pub use error::{SchedulingError, ToolFault};
pub use executor::{ExecutorConfig, SessionScheduler};
pub use mode::{DEFAULT_AGENT_MODE_THRESHOLD, should_use_agent_mode};
pub use pricing::{CostLedger, LedgerEntry, ModelPricing, PricingError, PricingTable};
pub use providers::{ClaudeAdapter, GeminiAdapter, ModelProvider, OpenAiAdapter};
pub use types::{ScheduleOutcome, SchedulingRequest, TimeOfDay, TokenTotals};
