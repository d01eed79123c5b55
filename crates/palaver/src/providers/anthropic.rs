use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Completion, CompletionEvent, CompletionStream, Provider, StopReason, Usage};
use super::configs::AnthropicProviderConfig;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::WebSearch;

pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn messages_to_wire(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };

                let content: Vec<Value> = message
                    .content
                    .iter()
                    .map(|block| match block {
                        MessageContent::Text(text) => json!({
                            "type": "text",
                            "text": text.text,
                        }),
                        MessageContent::ToolUse(tool_use) => json!({
                            "type": "server_tool_use",
                            "id": tool_use.id,
                            "name": tool_use.name,
                            "input": tool_use.input,
                        }),
                        MessageContent::ToolResult(result) => json!({
                            "type": "web_search_tool_result",
                            "tool_use_id": result.tool_use_id,
                            "content": result.content,
                        }),
                    })
                    .collect();

                json!({"role": role, "content": content})
            })
            .collect()
    }

    fn tools_to_wire(tools: &[WebSearch]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "web_search_20250305",
                    "name": "web_search",
                    "max_uses": tool.max_uses,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[WebSearch],
        temperature: f32,
    ) -> Result<CompletionStream> {
        let payload = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system,
            "messages": Self::messages_to_wire(messages),
            "tools": Self::tools_to_wire(tools),
            "temperature": temperature,
            "stream": true,
        });

        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                return Err(anyhow!("Server error: {}", status));
            }
            status => {
                let error_text = response.text().await?;
                return Err(anyhow!("Request failed: {} - {}", status, error_text));
            }
        }

        let mut body = response.bytes_stream();
        Ok(Box::pin(async_stream::try_stream! {
            let mut parser = EventParser::new();
            let mut builder = RoundBuilder::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                for data in parser.feed(&chunk) {
                    let event: Value = serde_json::from_str(&data)?;
                    for out in builder.apply(&event)? {
                        yield out;
                    }
                }
            }
        }))
    }
}

/// Incremental splitter for the `data:` lines of an SSE byte stream.
/// Chunk boundaries can fall anywhere, including inside a UTF-8 sequence,
/// so lines are assembled at the byte level first.
struct EventParser {
    buffer: Vec<u8>,
}

impl EventParser {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end();
            if let Some(data) = line.strip_prefix("data: ") {
                events.push(data.to_string());
            }
        }
        events
    }
}

/// One content block while its deltas are still arriving.
enum BlockInProgress {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
    },
}

/// Assembles the protocol events of one round back into a `Completion`,
/// emitting text deltas as they arrive.
struct RoundBuilder {
    message: Message,
    current: Option<BlockInProgress>,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

impl RoundBuilder {
    fn new() -> Self {
        Self {
            message: Message::assistant(),
            current: None,
            stop_reason: None,
            usage: Usage::default(),
        }
    }

    fn apply(&mut self, event: &Value) -> Result<Vec<CompletionEvent>> {
        let event_type = event
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("protocol event without a type: {}", event))?;

        match event_type {
            "message_start" => {
                self.usage.input_tokens = event["message"]["usage"]["input_tokens"]
                    .as_i64()
                    .unwrap_or(0);
            }
            "content_block_start" => {
                let block = &event["content_block"];
                self.current = match block["type"].as_str() {
                    Some("text") => Some(BlockInProgress::Text(
                        block["text"].as_str().unwrap_or("").to_string(),
                    )),
                    Some("server_tool_use") | Some("tool_use") => Some(BlockInProgress::ToolUse {
                        id: block["id"].as_str().unwrap_or("").to_string(),
                        name: block["name"].as_str().unwrap_or("").to_string(),
                        input_json: String::new(),
                    }),
                    Some("web_search_tool_result") => Some(BlockInProgress::ToolResult {
                        tool_use_id: block["tool_use_id"].as_str().unwrap_or("").to_string(),
                        content: block["content"].clone(),
                    }),
                    _ => None,
                };
            }
            "content_block_delta" => match event["delta"]["type"].as_str() {
                Some("text_delta") => {
                    let text = event["delta"]["text"].as_str().unwrap_or("").to_string();
                    if let Some(BlockInProgress::Text(buffer)) = &mut self.current {
                        buffer.push_str(&text);
                    }
                    return Ok(vec![CompletionEvent::TextDelta(text)]);
                }
                Some("input_json_delta") => {
                    if let Some(BlockInProgress::ToolUse { input_json, .. }) = &mut self.current {
                        input_json
                            .push_str(event["delta"]["partial_json"].as_str().unwrap_or(""));
                    }
                }
                _ => {}
            },
            "content_block_stop" => {
                if let Some(block) = self.current.take() {
                    self.message.content.push(match block {
                        BlockInProgress::Text(text) => MessageContent::text(text),
                        BlockInProgress::ToolUse {
                            id,
                            name,
                            input_json,
                        } => {
                            let input = if input_json.is_empty() {
                                json!({})
                            } else {
                                serde_json::from_str(&input_json)?
                            };
                            MessageContent::tool_use(id, name, input)
                        }
                        BlockInProgress::ToolResult {
                            tool_use_id,
                            content,
                        } => MessageContent::tool_result(tool_use_id, content),
                    });
                }
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(StopReason::parse(reason));
                }
                if let Some(output) = event["usage"]["output_tokens"].as_i64() {
                    self.usage.output_tokens = output;
                }
            }
            "message_stop" => {
                let completion = Completion {
                    message: std::mem::replace(&mut self.message, Message::assistant()),
                    stop_reason: self.stop_reason.take().unwrap_or(StopReason::EndTurn),
                    usage: self.usage,
                };
                return Ok(vec![CompletionEvent::Completed(completion)]);
            }
            "error" => {
                return Err(anyhow!("model stream error: {}", event["error"]));
            }
            // ping and future event types carry nothing we need
            _ => {}
        }

        Ok(Vec::new())
    }
}
