//! OpenAI adapter (chat completions API)

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

/// Adapter for the OpenAI chat completions API. Tool calls ride on the
/// assistant message; each observation becomes a separate `tool`-role
/// message carrying the originating call id.
pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiAdapter {
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

    fn encode_messages(messages: &[AgentMessage], system: &str) -> Vec<WireMessage> {
        let mut out = vec![WireMessage {
            role: "system".to_string(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }];

        for msg in messages {
            match msg.role {
                MessageRole::Assistant => {
                    let mut text_parts = Vec::new();
                    let mut tool_calls = Vec::new();

                    for part in &msg.parts {
                        match part {
                            MessagePart::Text { text } => text_parts.push(text.clone()),
                            MessagePart::ToolCall { id, name, arguments } => {
                                tool_calls.push(WireToolCall {
                                    id: id.clone(),
                                    r#type: "function".to_string(),
                                    function: WireFunction {
                                        name: name.clone(),
                                        arguments: serde_json::to_string(arguments)
                                            .unwrap_or_default(),
                                    },
                                });
                            }
                            MessagePart::ToolResult { .. } => {}
                        }
                    }

                    out.push(WireMessage {
                        role: "assistant".to_string(),
                        content: if text_parts.is_empty() {
                            None
                        } else {
                            Some(text_parts.join("\n"))
                        },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    });
                }
                MessageRole::User => {
                    let mut text_parts = Vec::new();

                    for part in &msg.parts {
                        match part {
                            MessagePart::Text { text } => text_parts.push(text.clone()),
                            MessagePart::ToolResult { call_id, content, .. } => {
                                out.push(WireMessage {
                                    role: "tool".to_string(),
                                    content: Some(content.clone()),
                                    tool_calls: None,
                                    tool_call_id: Some(call_id.clone()),
                                });
                            }
                            MessagePart::ToolCall { .. } => {}
                        }
                    }

                    if !text_parts.is_empty() {
                        out.push(WireMessage {
                            role: "user".to_string(),
                            content: Some(text_parts.join("\n")),
                            tool_calls: None,
                            tool_call_id: None,
                        });
                    }
                }
            }
        }

        out
    }

    fn encode_tools(tools: &[ToolSpec]) -> Vec<WireToolDef> {
        tools
            .iter()
            .map(|t| WireToolDef {
                r#type: "function".to_string(),
                function: WireToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    fn decode_response(resp: WireResponse) -> Result<ModelTurn> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OpenAI response had no choices"))?;

        let mut parts = Vec::new();

        if let Some(content) = choice.message.content
            && !content.is_empty()
        {
            parts.push(TurnPart::Text { text: content });
        }

        if let Some(tool_calls) = choice.message.tool_calls {
            for tc in tool_calls {
                // Arguments arrive as a JSON string; an unparseable
                // payload fails the turn rather than silently becoming {}
                let arguments: Value = serde_json::from_str(&tc.function.arguments)
                    .with_context(|| {
                        format!("Unparseable arguments for tool call {}", tc.function.name)
                    })?;
                parts.push(TurnPart::ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                });
            }
        }

        let stop = match choice.finish_reason.as_deref() {
            Some("tool_calls") => TurnStop::ToolUse,
            Some("stop") => TurnStop::EndTurn,
            Some("length") => TurnStop::MaxTokens,
            _ => TurnStop::Unknown,
        };

        let usage = resp.usage.map_or(TokenUsage::default(), |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(ModelTurn { parts, stop, usage })
    }
}

#[async_trait]
impl ModelProvider for OpenAiAdapter {
    fn provider_name(&self) -> &str {
        "openai"
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
        let url = format!("{}/v1/chat/completions", self.base_url);
        let wire_messages = Self::encode_messages(messages, system);

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": wire_messages,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(Self::encode_tools(tools))?;
        }

        debug!(
            "OpenAI request: model={}, messages={}",
            self.model,
            wire_messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "OpenAI API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let wire: WireResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI API response")?;

        debug!(
            "OpenAI response: choices={}, finish_reason={:?}",
            wire.choices.len(),
            wire.choices.first().map(|c| &c.finish_reason)
        );

        Self::decode_response(wire)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolDef {
    r#type: String,
    function: WireToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_system_message_first() {
        let msgs = vec![AgentMessage::user_text("schedule 3 math sessions")];
        let wire = OpenAiAdapter::encode_messages(&msgs, "You schedule sessions.");
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[1].role, "user");
    }

    #[test]
    fn test_encode_tool_results_as_tool_role() {
        let msgs = vec![
            AgentMessage::assistant_parts(vec![MessagePart::ToolCall {
                id: "call_1".to_string(),
                name: "check_time_slot".to_string(),
                arguments: serde_json::json!({"date": "2026-09-07"}),
            }]),
            AgentMessage::user_parts(vec![MessagePart::ToolResult {
                call_id: "call_1".to_string(),
                name: "check_time_slot".to_string(),
                content: r#"{"has_conflict":false}"#.to_string(),
            }]),
        ];
        let wire = OpenAiAdapter::encode_messages(&msgs, "sys");
        // system + assistant(tool_calls) + tool(result)
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1].role, "assistant");
        assert!(wire[1].tool_calls.is_some());
        assert_eq!(wire[2].role, "tool");
        assert_eq!(wire[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_decode_parallel_tool_calls() {
        let resp = WireResponse {
            choices: vec![WireChoice {
                message: WireChoiceMessage {
                    content: None,
                    tool_calls: Some(vec![
                        WireToolCall {
                            id: "call_1".to_string(),
                            r#type: "function".to_string(),
                            function: WireFunction {
                                name: "check_time_slot".to_string(),
                                arguments: r#"{"date":"2026-09-07"}"#.to_string(),
                            },
                        },
                        WireToolCall {
                            id: "call_2".to_string(),
                            r#type: "function".to_string(),
                            function: WireFunction {
                                name: "check_time_slot".to_string(),
                                arguments: r#"{"date":"2026-09-08"}"#.to_string(),
                            },
                        },
                    ]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: Some(WireUsage {
                prompt_tokens: 300,
                completion_tokens: 60,
            }),
        };
        let turn = OpenAiAdapter::decode_response(resp).unwrap();
        assert_eq!(turn.stop, TurnStop::ToolUse);
        assert_eq!(turn.tool_calls().len(), 2);
    }

    #[test]
    fn test_decode_unparseable_arguments_is_error() {
        let resp = WireResponse {
            choices: vec![WireChoice {
                message: WireChoiceMessage {
                    content: None,
                    tool_calls: Some(vec![WireToolCall {
                        id: "call_1".to_string(),
                        r#type: "function".to_string(),
                        function: WireFunction {
                            name: "schedule_session".to_string(),
                            arguments: "{not json".to_string(),
                        },
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };
        assert!(OpenAiAdapter::decode_response(resp).is_err());
    }

    #[test]
    fn test_decode_end_turn() {
        let resp = WireResponse {
            choices: vec![WireChoice {
                message: WireChoiceMessage {
                    content: Some("Placed all sessions.".to_string()),
                    tool_calls: None,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(WireUsage {
                prompt_tokens: 50,
                completion_tokens: 8,
            }),
        };
        let turn = OpenAiAdapter::decode_response(resp).unwrap();
        assert_eq!(turn.stop, TurnStop::EndTurn);
        assert_eq!(turn.text(), "Placed all sessions.");
    }

    #[test]
    fn test_decode_no_choices_is_error() {
        let resp = WireResponse {
            choices: vec![],
            usage: None,
        };
        assert!(OpenAiAdapter::decode_response(resp).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let adapter = OpenAiAdapter::new(
            "sk-secret".to_string(),
            "gpt-4o".to_string(),
            "https://api.openai.com".to_string(),
            4096,
        );
        assert!(!format!("{:?}", adapter).contains("sk-secret"));
    }
}
