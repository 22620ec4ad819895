//! Google Gemini adapter.
//!
//! Gemini uses `model` instead of `assistant`, carries images as inline
//! data parts, and signals tool use via `functionCall` parts. It ships a
//! native Google Search grounding tool, so the generic `web_search` tool
//! is withheld from this provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};
use uuid::Uuid;

use super::request::{normalize_turns, Attachment, ChatTurn, ToolCall, TurnContent};
use super::{Provider, ToolDef};
use crate::core::Config;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiProvider {
    pub fn new(config: &Config) -> Self {
        GeminiProvider {
            http: reqwest::Client::new(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }

    fn build_contents(&self, turns: &[ChatTurn], attachments: &[Attachment]) -> Vec<Value> {
        let turns = normalize_turns(turns.to_vec());

        let mut contents: Vec<Value> = turns
            .iter()
            .map(|turn| match &turn.content {
                TurnContent::Text(text) => {
                    let role = if turn.role == "assistant" { "model" } else { "user" };
                    json!({"role": role, "parts": [{"text": text}]})
                }
                TurnContent::Blocks(message) => message.clone(),
            })
            .collect();

        let images: Vec<&Attachment> = attachments.iter().filter(|a| a.is_image()).collect();
        if !images.is_empty() {
            if let Some(last) = contents.last_mut() {
                if let Some(parts) = last.get_mut("parts").and_then(Value::as_array_mut) {
                    for att in images {
                        parts.push(json!({
                            "inlineData": {
                                "mimeType": att.content_type,
                                "data": att.b64(),
                            }
                        }));
                    }
                }
            }
        }

        contents
    }

    async fn post_generate(&self, body: &Value) -> Result<Value> {
        let url = format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {status}: {detail}");
        }
        response
            .json()
            .await
            .context("Malformed Gemini response body")
    }

    fn parse_candidate(response: &Value) -> (Option<String>, Vec<ToolCall>) {
        let mut text_parts: Vec<&str> = Vec::new();
        let mut calls = Vec::new();

        if let Some(parts) = response["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part["text"].as_str() {
                    text_parts.push(text);
                } else if let Some(function_call) = part.get("functionCall") {
                    // Gemini carries no call id; synthesize one so the
                    // engine's per-round uniqueness invariant holds
                    calls.push(ToolCall {
                        id: Uuid::new_v4().to_string(),
                        name: function_call["name"].as_str().unwrap_or_default().to_string(),
                        arguments: function_call
                            .get("args")
                            .cloned()
                            .unwrap_or_else(|| json!({})),
                    });
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

    fn base_body(&self, system_prompt: &str, contents: Vec<Value>) -> Value {
        json!({
            "system_instruction": {"parts": [{"text": system_prompt}]},
            "contents": contents,
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn has_native_web_search(&self) -> bool {
        true
    }

    async fn call_single(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        attachments: &[Attachment],
    ) -> Result<String> {
        let body = self.base_body(system_prompt, self.build_contents(turns, attachments));
        let response = self.post_generate(&body).await?;
        let (text, _) = Self::parse_candidate(&response);
        Ok(text.unwrap_or_default().trim().to_string())
    }

    fn format_tools(&self, tools: &[ToolDef]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        json!([{"functionDeclarations": declarations}])
    }

    async fn call_with_tools(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        provider_tools: &Value,
        attachments: &[Attachment],
    ) -> Result<(Option<String>, Vec<ToolCall>)> {
        let mut body = self.base_body(system_prompt, self.build_contents(turns, attachments));
        body["tools"] = provider_tools.clone();
        let response = self.post_generate(&body).await?;
        let (text, calls) = Self::parse_candidate(&response);
        debug!("gemini round returned {} tool call(s)", calls.len());
        Ok((text, calls))
    }

    fn append_tool_result(&self, turns: &mut Vec<ChatTurn>, call: &ToolCall, result: &str) {
        turns.push(ChatTurn::blocks(
            "assistant",
            json!({
                "role": "model",
                "parts": [{
                    "functionCall": {
                        "name": call.name,
                        "args": call.arguments,
                    }
                }]
            }),
        ));
        turns.push(ChatTurn::blocks(
            "user",
            json!({
                "role": "user",
                "parts": [{
                    "functionResponse": {
                        "name": call.name,
                        "response": {"content": result},
                    }
                }]
            }),
        ));
    }
}
