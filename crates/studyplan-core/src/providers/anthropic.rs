//! Anthropic Claude adapter (messages API)

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::types::{
    AgentMessage, MessagePart, MessageRole, ModelProvider, ModelTurn, TokenUsage, ToolSpec,
    TurnPart, TurnStop,
};

/// Adapter for the Anthropic messages API. Tool declarations go out
/// verbatim; observations return as `tool_result` blocks inside a
/// user message.
pub struct ClaudeAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for ClaudeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeAdapter")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ClaudeAdapter {
    pub fn new(api_key: String, model: String, base_url: String, max_tokens: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url,
            model,
            max_tokens,
        }
    }

    fn encode_messages(messages: &[AgentMessage]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                let blocks = m
                    .parts
                    .iter()
                    .map(|p| match p {
                        MessagePart::Text { text } => WireBlock::Text { text: text.clone() },
                        MessagePart::ToolCall { id, name, arguments } => WireBlock::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            input: arguments.clone(),
                        },
                        MessagePart::ToolResult { call_id, content, .. } => WireBlock::ToolResult {
                            tool_use_id: call_id.clone(),
                            content: content.clone(),
                        },
                    })
                    .collect();
                WireMessage {
                    role: role.to_string(),
                    content: blocks,
                }
            })
            .collect()
    }

    fn decode_response(resp: WireResponse) -> ModelTurn {
        let parts = resp
            .content
            .into_iter()
            .filter_map(|b| match b {
                WireBlock::Text { text } => Some(TurnPart::Text { text }),
                WireBlock::ToolUse { id, name, input } => Some(TurnPart::ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                // Never expected in a response; drop rather than fail the turn
                WireBlock::ToolResult { .. } => None,
            })
            .collect();

        let stop = match resp.stop_reason.as_deref() {
            Some("tool_use") => TurnStop::ToolUse,
            Some("end_turn") => TurnStop::EndTurn,
            Some("max_tokens") => TurnStop::MaxTokens,
            _ => TurnStop::Unknown,
        };

        ModelTurn {
            parts,
            stop,
            usage: TokenUsage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
            },
        }
    }
}

#[async_trait]
impl ModelProvider for ClaudeAdapter {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[AgentMessage],
        tools: &[ToolSpec],
        system: &str,
    ) -> Result<ModelTurn> {
        let url = format!("{}/v1/messages", self.base_url);
        let wire_messages = Self::encode_messages(messages);

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": wire_messages,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
        }

        debug!(
            "Anthropic request: model={}, messages={}",
            self.model,
            wire_messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Anthropic API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let wire: WireResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;

        debug!(
            "Anthropic response: blocks={}, stop_reason={:?}",
            wire.content.len(),
            wire.stop_reason
        );

        Ok(Self::decode_response(wire))
    }
}

// ── Anthropic wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: Vec<WireBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponse {
    #[allow(dead_code)]
    id: String,
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Debug, Clone, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_tool_result_shape() {
        let msgs = vec![AgentMessage::user_parts(vec![MessagePart::ToolResult {
            call_id: "tu_1".to_string(),
            name: "check_time_slot".to_string(),
            content: r#"{"has_conflict":false}"#.to_string(),
        }])];
        let wire = ClaudeAdapter::encode_messages(&msgs);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
        let json = serde_json::to_value(&wire[0]).unwrap();
        assert_eq!(json["content"][0]["type"], "tool_result");
        assert_eq!(json["content"][0]["tool_use_id"], "tu_1");
    }

    #[test]
    fn test_encode_assistant_tool_call() {
        let msgs = vec![AgentMessage::assistant_parts(vec![MessagePart::ToolCall {
            id: "tu_2".to_string(),
            name: "get_busy_periods".to_string(),
            arguments: serde_json::json!({"range_start": "2026-09-01"}),
        }])];
        let wire = ClaudeAdapter::encode_messages(&msgs);
        let json = serde_json::to_value(&wire[0]).unwrap();
        assert_eq!(json["content"][0]["type"], "tool_use");
        assert_eq!(json["content"][0]["name"], "get_busy_periods");
    }

    #[test]
    fn test_decode_tool_use_turn() {
        let resp = WireResponse {
            id: "msg_1".to_string(),
            content: vec![
                WireBlock::Text {
                    text: "Let me check the calendar first.".to_string(),
                },
                WireBlock::ToolUse {
                    id: "tu_1".to_string(),
                    name: "get_busy_periods".to_string(),
                    input: serde_json::json!({}),
                },
            ],
            stop_reason: Some("tool_use".to_string()),
            usage: WireUsage {
                input_tokens: 200,
                output_tokens: 40,
            },
        };
        let turn = ClaudeAdapter::decode_response(resp);
        assert_eq!(turn.stop, TurnStop::ToolUse);
        assert_eq!(turn.tool_calls().len(), 1);
        assert_eq!(turn.usage.prompt_tokens, 200);
        assert_eq!(turn.text(), "Let me check the calendar first.");
    }

    #[test]
    fn test_decode_end_turn() {
        let resp = WireResponse {
            id: "msg_2".to_string(),
            content: vec![WireBlock::Text {
                text: "All sessions placed.".to_string(),
            }],
            stop_reason: Some("end_turn".to_string()),
            usage: WireUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        };
        let turn = ClaudeAdapter::decode_response(resp);
        assert_eq!(turn.stop, TurnStop::EndTurn);
        assert!(turn.tool_calls().is_empty());
    }

    #[test]
    fn test_debug_hides_key() {
        let adapter = ClaudeAdapter::new(
            "sk-ant-secret".to_string(),
            "claude-sonnet-4-5".to_string(),
            "https://api.anthropic.com".to_string(),
            4096,
        );
        assert!(!format!("{:?}", adapter).contains("sk-ant-secret"));
    }
}
