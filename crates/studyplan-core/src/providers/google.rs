//! Google Gemini adapter (generateContent API)

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

/// Adapter for the Gemini generateContent API. Gemini has no tool-call
/// ids, so observations are keyed by function name and synthetic ids
/// are minted on the way in.
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl GeminiAdapter {
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model,
            max_tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn encode_contents(messages: &[AgentMessage]) -> Vec<WireContent> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "model",
                };
                let parts = m
                    .parts
                    .iter()
                    .map(|p| match p {
                        MessagePart::Text { text } => WirePart::Text { text: text.clone() },
                        MessagePart::ToolCall { name, arguments, .. } => WirePart::FunctionCall {
                            function_call: WireFunctionCall {
                                name: name.clone(),
                                args: arguments.clone(),
                            },
                        },
                        MessagePart::ToolResult { name, content, .. } => {
                            WirePart::FunctionResponse {
                                function_response: WireFunctionResponse {
                                    name: name.clone(),
                                    response: serde_json::json!({ "result": content }),
                                },
                            }
                        }
                    })
                    .collect();
                WireContent {
                    role: role.to_string(),
                    parts,
                }
            })
            .collect()
    }

    fn encode_tools(tools: &[ToolSpec]) -> Vec<WireToolDecl> {
        if tools.is_empty() {
            return vec![];
        }
        vec![WireToolDecl {
            function_declarations: tools
                .iter()
                .map(|t| WireFunctionDecl {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                })
                .collect(),
        }]
    }

    fn decode_response(resp: WireResponse) -> Result<ModelTurn> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Gemini response had no candidates"))?;

        let mut parts = Vec::new();
        let mut call_index = 0u32;

        for part in candidate.content.parts {
            match part {
                WirePart::Text { text } => parts.push(TurnPart::Text { text }),
                WirePart::FunctionCall { function_call } => {
                    // Synthesize an id; Gemini keys continuations by name
                    parts.push(TurnPart::ToolCall {
                        id: format!("gemini_{}_{}", function_call.name, call_index),
                        name: function_call.name,
                        arguments: function_call.args,
                    });
                    call_index += 1;
                }
                WirePart::FunctionResponse { .. } => {}
            }
        }

        let stop = if call_index > 0 {
            TurnStop::ToolUse
        } else {
            match candidate.finish_reason.as_deref() {
                Some("STOP") => TurnStop::EndTurn,
                Some("MAX_TOKENS") => TurnStop::MaxTokens,
                _ => TurnStop::EndTurn,
            }
        };

        let usage = resp
            .usage_metadata
            .map_or(TokenUsage::default(), |u| TokenUsage {
                prompt_tokens: u.prompt_token_count.unwrap_or(0),
                completion_tokens: u.candidates_token_count.unwrap_or(0),
            });

        Ok(ModelTurn { parts, stop, usage })
    }
}

#[async_trait]
impl ModelProvider for GeminiAdapter {
    fn provider_name(&self) -> &str {
        "google"
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
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let contents = Self::encode_contents(messages);

        let mut body = serde_json::json!({
            "contents": contents,
            "systemInstruction": { "parts": [{ "text": system }] },
            "generationConfig": { "maxOutputTokens": self.max_tokens },
        });

        let wire_tools = Self::encode_tools(tools);
        if !wire_tools.is_empty() {
            body["tools"] = serde_json::to_value(&wire_tools)?;
        }

        debug!(
            "Gemini request: model={}, contents={}",
            self.model,
            contents.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Gemini API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let wire: WireResponse = response
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        debug!("Gemini response: candidates={}", wire.candidates.len());

        Self::decode_response(wire)
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireContent {
    role: String,
    parts: Vec<WirePart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: WireFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: WireFunctionResponse,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolDecl {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<WireFunctionDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionDecl {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponse {
    candidates: Vec<WireCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<WireUsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireCandidate {
    content: WireContent,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireUsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_assistant_role_is_model() {
        let msgs = vec![AgentMessage::assistant_parts(vec![MessagePart::Text {
            text: "placing sessions".to_string(),
        }])];
        let wire = GeminiAdapter::encode_contents(&msgs);
        assert_eq!(wire[0].role, "model");
    }

    #[test]
    fn test_encode_tool_result_keyed_by_name() {
        let msgs = vec![AgentMessage::user_parts(vec![MessagePart::ToolResult {
            call_id: "gemini_check_time_slot_0".to_string(),
            name: "check_time_slot".to_string(),
            content: r#"{"has_conflict":true}"#.to_string(),
        }])];
        let wire = GeminiAdapter::encode_contents(&msgs);
        let json = serde_json::to_value(&wire[0]).unwrap();
        assert_eq!(
            json["parts"][0]["functionResponse"]["name"],
            "check_time_slot"
        );
        assert!(
            json["parts"][0]["functionResponse"]["response"]["result"]
                .as_str()
                .unwrap()
                .contains("has_conflict")
        );
    }

    #[test]
    fn test_encode_tools_single_declaration_group() {
        let tools = vec![
            ToolSpec {
                name: "get_busy_periods".to_string(),
                description: "Rank days by load".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            },
            ToolSpec {
                name: "check_time_slot".to_string(),
                description: "Check a slot".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            },
        ];
        let wire = GeminiAdapter::encode_tools(&tools);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].function_declarations.len(), 2);
    }

    #[test]
    fn test_decode_multiple_function_calls_get_distinct_ids() {
        let resp = WireResponse {
            candidates: vec![WireCandidate {
                content: WireContent {
                    role: "model".to_string(),
                    parts: vec![
                        WirePart::FunctionCall {
                            function_call: WireFunctionCall {
                                name: "check_time_slot".to_string(),
                                args: serde_json::json!({"date": "2026-09-07"}),
                            },
                        },
                        WirePart::FunctionCall {
                            function_call: WireFunctionCall {
                                name: "check_time_slot".to_string(),
                                args: serde_json::json!({"date": "2026-09-08"}),
                            },
                        },
                    ],
                },
                finish_reason: Some("STOP".to_string()),
            }],
            usage_metadata: None,
        };
        let turn = GeminiAdapter::decode_response(resp).unwrap();
        assert_eq!(turn.stop, TurnStop::ToolUse);
        let calls = turn.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].0, calls[1].0);
    }

    #[test]
    fn test_decode_end_turn_with_usage() {
        let resp = WireResponse {
            candidates: vec![WireCandidate {
                content: WireContent {
                    role: "model".to_string(),
                    parts: vec![WirePart::Text {
                        text: "Done.".to_string(),
                    }],
                },
                finish_reason: Some("STOP".to_string()),
            }],
            usage_metadata: Some(WireUsageMetadata {
                prompt_token_count: Some(150),
                candidates_token_count: Some(20),
            }),
        };
        let turn = GeminiAdapter::decode_response(resp).unwrap();
        assert_eq!(turn.stop, TurnStop::EndTurn);
        assert_eq!(turn.usage.prompt_tokens, 150);
        assert_eq!(turn.usage.completion_tokens, 20);
    }

    #[test]
    fn test_decode_no_candidates_is_error() {
        let resp = WireResponse {
            candidates: vec![],
            usage_metadata: None,
        };
        assert!(GeminiAdapter::decode_response(resp).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let adapter =
            GeminiAdapter::new("AIza-secret".to_string(), "gemini-2.0-flash".to_string(), 4096);
        assert!(!format!("{:?}", adapter).contains("AIza-secret"));
    }
}
