//! Provider-agnostic conversation types
//!
//! Three function-calling wire protocols normalize into this one
//! internal shape. The executor only ever sees [`AgentMessage`] going
//! out and [`ModelTurn`] coming back; everything provider-specific
//! lives behind [`ModelProvider`].

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message in the accumulated conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

impl AgentMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    pub fn user_parts(parts: Vec<MessagePart>) -> Self {
        Self {
            role: MessageRole::User,
            parts,
        }
    }

    pub fn assistant_parts(parts: Vec<MessagePart>) -> Self {
        Self {
            role: MessageRole::Assistant,
            parts,
        }
    }
}

/// Conversation role. The system prompt travels separately because
/// every provider wants it somewhere different.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A structured piece of a message: free text, a model-requested tool
/// invocation, or the observation answering one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePart {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        /// Tool name echoed back; Gemini keys function responses by
        /// name rather than call id
        name: String,
        content: String,
    },
}

/// Normalized response to one reasoning request
#[derive(Debug, Clone)]
pub struct ModelTurn {
    pub parts: Vec<TurnPart>,
    pub stop: TurnStop,
    pub usage: TokenUsage,
}

impl ModelTurn {
    /// Tool invocations in the order the model proposed them
    pub fn tool_calls(&self) -> Vec<(&str, &str, &Value)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                TurnPart::ToolCall { id, name, arguments } => {
                    Some((id.as_str(), name.as_str(), arguments))
                }
                TurnPart::Text { .. } => None,
            })
            .collect()
    }

    /// Concatenated free text, if any
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                TurnPart::Text { text } => Some(text.as_str()),
                TurnPart::ToolCall { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A block in the model's response
#[derive(Debug, Clone)]
pub enum TurnPart {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStop {
    EndTurn,
    ToolUse,
    MaxTokens,
    Unknown,
}

/// Provider-reported token counts for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Declaration of one tool in the fixed catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Trait every LLM backend implements
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Short provider identifier ("anthropic", "google", "openai")
    fn provider_name(&self) -> &str;

    /// Active model identifier, used to look up unit pricing
    fn model(&self) -> &str;

    /// One reasoning request: accumulated conversation in, normalized
    /// turn out. An unparseable response is an `Err` — the executor
    /// treats it as a no-progress turn.
    async fn complete(
        &self,
        messages: &[AgentMessage],
        tools: &[ToolSpec],
        system: &str,
    ) -> Result<ModelTurn>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_calls_in_order() {
        let turn = ModelTurn {
            parts: vec![
                TurnPart::Text {
                    text: "checking two slots".to_string(),
                },
                TurnPart::ToolCall {
                    id: "a".to_string(),
                    name: "check_time_slot".to_string(),
                    arguments: serde_json::json!({"date": "2026-09-07"}),
                },
                TurnPart::ToolCall {
                    id: "b".to_string(),
                    name: "schedule_session".to_string(),
                    arguments: serde_json::json!({}),
                },
            ],
            stop: TurnStop::ToolUse,
            usage: TokenUsage::default(),
        };
        let calls = turn.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, "check_time_slot");
        assert_eq!(calls[1].1, "schedule_session");
    }

    #[test]
    fn test_turn_text_joins_blocks() {
        let turn = ModelTurn {
            parts: vec![
                TurnPart::Text {
                    text: "first".to_string(),
                },
                TurnPart::Text {
                    text: "second".to_string(),
                },
            ],
            stop: TurnStop::EndTurn,
            usage: TokenUsage::default(),
        };
        assert_eq!(turn.text(), "first\nsecond");
    }

    #[test]
    fn test_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 1800,
            completion_tokens: 700,
        };
        assert_eq!(usage.total(), 2500);
    }

    #[test]
    fn test_message_constructors() {
        let msg = AgentMessage::user_text("place 3 sessions");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.parts.len(), 1);

        let msg = AgentMessage::assistant_parts(vec![]);
        assert_eq!(msg.role, MessageRole::Assistant);
    }
}
