//! Anthropic Messages API adapter.
//!
//! Anthropic enforces strict user/assistant alternation, which is why the
//! shared role normalization exists in the first place. Tool use travels
//! as `tool_use` / `tool_result` content blocks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};

use super::request::{normalize_turns, Attachment, ChatTurn, ToolCall, TurnContent};
use super::{Provider, ToolDef};
use crate::core::Config;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(config: &Config) -> Self {
        AnthropicProvider {
            http: reqwest::Client::new(),
            api_key: config.anthropic_api_key.clone(),
            model: config.anthropic_model.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }

    fn build_messages(&self, turns: &[ChatTurn], attachments: &[Attachment]) -> Vec<Value> {
        let turns = normalize_turns(turns.to_vec());

        let mut messages: Vec<Value> = turns
            .iter()
            .map(|turn| match &turn.content {
                TurnContent::Text(text) => json!({"role": turn.role, "content": text}),
                TurnContent::Blocks(message) => message.clone(),
            })
            .collect();

        let images: Vec<&Attachment> = attachments.iter().filter(|a| a.is_image()).collect();
        if !images.is_empty() {
            if let Some(last) = messages.last_mut() {
                let text = last
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let mut content: Vec<Value> = images
                    .iter()
                    .map(|att| {
                        json!({
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": att.content_type,
                                "data": att.b64(),
                            }
                        })
                    })
                    .collect();
                content.push(json!({"type": "text", "text": text}));
                let role = last.get("role").and_then(Value::as_str).unwrap_or("user");
                *last = json!({"role": role, "content": content});
            }
        }

        messages
    }

    async fn post_messages(&self, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error {status}: {detail}");
        }
        response
            .json()
            .await
            .context("Malformed Anthropic response body")
    }

    /// Concatenated text blocks and tool_use blocks from a response
    fn parse_content(response: &Value) -> (Option<String>, Vec<ToolCall>) {
        let mut text_parts: Vec<&str> = Vec::new();
        let mut calls = Vec::new();

        if let Some(blocks) = response["content"].as_array() {
            for block in blocks {
                match block["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = block["text"].as_str() {
                            text_parts.push(text);
                        }
                    }
                    Some("tool_use") => calls.push(ToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].clone(),
                    }),
                    _ => {}
                }
            }
        }

        let text = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join(""))
        };
        (text, calls)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn call_single(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        attachments: &[Attachment],
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system_prompt,
            "messages": self.build_messages(turns, attachments),
        });
        let response = self.post_messages(&body).await?;
        let (text, _) = Self::parse_content(&response);
        Ok(text.unwrap_or_default().trim().to_string())
    }

    fn format_tools(&self, tools: &[ToolDef]) -> Value {
        Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect(),
        )
    }

    async fn call_with_tools(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        provider_tools: &Value,
        attachments: &[Attachment],
    ) -> Result<(Option<String>, Vec<ToolCall>)> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system_prompt,
            "messages": self.build_messages(turns, attachments),
            "tools": provider_tools,
        });
        let response = self.post_messages(&body).await?;
        let (text, calls) = Self::parse_content(&response);
        debug!("anthropic round returned {} tool call(s)", calls.len());
        Ok((text, calls))
    }

    fn append_tool_result(&self, turns: &mut Vec<ChatTurn>, call: &ToolCall, result: &str) {
        turns.push(ChatTurn::blocks(
            "assistant",
            json!({
                "role": "assistant",
                "content": [{
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.arguments,
                }]
            }),
        ));
        turns.push(ChatTurn::blocks(
            "user",
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": result,
                }]
            }),
        ));
    }
}
