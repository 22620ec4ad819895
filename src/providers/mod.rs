//! # Providers Module
//!
//! The provider-agnostic generation contract and one adapter per LLM
//! vendor. Adapters own their vendor's transport and wire format; the
//! engine only ever sees [`ChatTurn`]s, [`ToolCall`]s and strings.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.5.0
//!
//! ## Changelog
//! - 2.0.0: Tool-calling contract (format_tools / call_with_tools / append_tool_result)
//! - 1.1.0: Gemini adapter
//! - 1.0.0: OpenAI-compatible and Anthropic adapters

pub mod anthropic;
pub mod engine;
pub mod gemini;
pub mod openai;
pub mod request;

pub use engine::{GenerationEngine, MAX_TOOL_ROUNDS};
pub use request::{
    normalize_turns, Attachment, ChatTurn, GenerationRequest, ToolCall, TurnContent,
    ATTACHMENT_NUDGE, SPONTANEOUS_NUDGE,
};

use crate::core::Config;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Provider-agnostic tool definition (JSON-schema parameters)
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Interface every text-generation provider must implement.
///
/// One implementation per vendor, selected at runtime by configured name.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when the vendor ships an equivalent built-in search capability.
    /// Such providers must not also receive the generic `web_search` tool,
    /// to avoid duplicate invocation paths.
    fn has_native_web_search(&self) -> bool {
        false
    }

    /// Single-shot call without tools
    async fn call_single(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        attachments: &[Attachment],
    ) -> Result<String>;

    /// Translate tool definitions into the vendor's tool format
    fn format_tools(&self, tools: &[ToolDef]) -> Value;

    /// Tool-capable call: returns optional text and zero or more tool calls
    async fn call_with_tools(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        provider_tools: &Value,
        attachments: &[Attachment],
    ) -> Result<(Option<String>, Vec<ToolCall>)>;

    /// Fold an executed tool call and its result back into the message
    /// sequence, in the vendor-specific representation
    fn append_tool_result(&self, turns: &mut Vec<ChatTurn>, call: &ToolCall, result: &str);
}

/// Names accepted by [`create_provider`]
pub const PROVIDER_NAMES: &[&str] = &["openai", "openai-compatible", "anthropic", "gemini"];

/// Instantiate a provider adapter by configured name
pub fn create_provider(name: &str, config: &Config) -> Result<Arc<dyn Provider>> {
    match name.to_lowercase().as_str() {
        "openai" | "openai-compatible" => Ok(Arc::new(openai::OpenAiProvider::new(config))),
        "anthropic" => Ok(Arc::new(anthropic::AnthropicProvider::new(config))),
        "gemini" => Ok(Arc::new(gemini::GeminiProvider::new(config))),
        other => anyhow::bail!(
            "Unknown provider '{other}'. Choose from: {}",
            PROVIDER_NAMES.join(", ")
        ),
    }
}
