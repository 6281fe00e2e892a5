//! Multi-provider function-calling abstraction
//!
//! Three incompatible tool-calling wire protocols (Anthropic messages,
//! Gemini generateContent, OpenAI chat completions) normalized into one
//! internal action/observation shape. The executor depends only on the
//! [`ModelProvider`] trait, never on a concrete adapter.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod types;

pub use anthropic::ClaudeAdapter;
pub use google::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use types::{
    AgentMessage, MessagePart, MessageRole, ModelProvider, ModelTurn, TokenUsage, ToolSpec,
    TurnPart, TurnStop,
};
