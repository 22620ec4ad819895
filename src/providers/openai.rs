//! OpenAI Chat Completions adapter.
//!
//! Works against api.openai.com or any server implementing
//! `/v1/chat/completions` (LM Studio, vLLM, Ollama's compat endpoint), so
//! this one adapter backs both the `openai` and `openai-compatible`
//! provider names.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};

use super::request::{normalize_turns, Attachment, ChatTurn, ToolCall, TurnContent};
use super::{Provider, ToolDef};
use crate::core::Config;

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(config: &Config) -> Self {
        OpenAiProvider {
            http: reqwest::Client::new(),
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.openai_model.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }

    /// Build the wire message list: system turn, then context, with image
    /// attachments folded into the final turn as data-URL blocks
    fn build_messages(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        attachments: &[Attachment],
    ) -> Vec<Value> {
        let turns = normalize_turns(turns.to_vec());

        let mut messages = vec![json!({"role": "system", "content": system_prompt})];
        for turn in &turns {
            match &turn.content {
                TurnContent::Text(text) => {
                    messages.push(json!({"role": turn.role, "content": text}));
                }
                TurnContent::Blocks(message) => messages.push(message.clone()),
            }
        }

        let images: Vec<&Attachment> = attachments.iter().filter(|a| a.is_image()).collect();
        if !images.is_empty() {
            if let Some(last) = messages.last_mut() {
                let text = last
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let mut content = vec![json!({"type": "text", "text": text})];
                for att in images {
                    content.push(json!({
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:{};base64,{}", att.content_type, att.b64())
                        }
                    }));
                }
                let role = last.get("role").and_then(Value::as_str).unwrap_or("user");
                *last = json!({"role": role, "content": content});
            }
        }

        messages
    }

    async fn post_completion(&self, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {detail}");
        }
        response
            .json()
            .await
            .context("Malformed OpenAI response body")
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn call_single(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        attachments: &[Attachment],
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": self.build_messages(system_prompt, turns, attachments),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let response = self.post_completion(&body).await?;

        Ok(response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    fn format_tools(&self, tools: &[ToolDef]) -> Value {
        Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
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
            "messages": self.build_messages(system_prompt, turns, attachments),
            "tools": provider_tools,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let response = self.post_completion(&body).await?;

        let message = &response["choices"][0]["message"];
        let text = message["content"].as_str().map(str::to_string);

        let mut calls = Vec::new();
        if let Some(raw_calls) = message["tool_calls"].as_array() {
            for raw in raw_calls {
                let arguments = raw["function"]["arguments"]
                    .as_str()
                    .and_then(|raw_args| serde_json::from_str(raw_args).ok())
                    .unwrap_or_else(|| json!({}));
                calls.push(ToolCall {
                    id: raw["id"].as_str().unwrap_or_default().to_string(),
                    name: raw["function"]["name"].as_str().unwrap_or_default().to_string(),
                    arguments,
                });
            }
        }

        debug!("openai round returned {} tool call(s)", calls.len());
        Ok((text, calls))
    }

    fn append_tool_result(&self, turns: &mut Vec<ChatTurn>, call: &ToolCall, result: &str) {
        turns.push(ChatTurn::blocks(
            "assistant",
            json!({
                "role": "assistant",
                "tool_calls": [{
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }
                }]
            }),
        ));
        turns.push(ChatTurn::blocks(
            "tool",
            json!({
                "role": "tool",
                "tool_call_id": call.id,
                "content": result,
            }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> OpenAiProvider {
        OpenAiProvider {
            http: reqwest::Client::new(),
            api_key: "test".to_string(),
            base_url: "http://localhost".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 1.0,
            max_tokens: 256,
        }
    }

    #[test]
    fn test_build_messages_prepends_system() {
        let provider = test_provider();
        let turns = vec![ChatTurn::user("hi")];
        let messages = provider.build_messages("sys", &turns, &[]);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hi");
    }

    #[test]
    fn test_build_messages_attaches_images_to_last_turn() {
        let provider = test_provider();
        let turns = vec![ChatTurn::user("look")];
        let attachments = vec![Attachment {
            filename: "x.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        }];
        let messages = provider.build_messages("sys", &turns, &attachments);
        let content = messages.last().unwrap()["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
    }

    #[test]
    fn test_format_tools_function_shape() {
        let provider = test_provider();
        let defs = vec![ToolDef {
            name: "web_search",
            description: "search",
            parameters: serde_json::json!({"type": "object"}),
        }];
        let formatted = provider.format_tools(&defs);
        assert_eq!(formatted[0]["type"], "function");
        assert_eq!(formatted[0]["function"]["name"], "web_search");
    }

    #[test]
    fn test_append_tool_result_adds_call_and_result() {
        let provider = test_provider();
        let mut turns = vec![ChatTurn::user("hi")];
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "web_search".to_string(),
            arguments: serde_json::json!({"query": "rust"}),
        };
        provider.append_tool_result(&mut turns, &call, "{\"results\":[]}");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, "assistant");
        assert_eq!(turns[2].role, "tool");
    }
}
