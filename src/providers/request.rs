//! Provider-agnostic request types and role normalization
//!
//! Every adapter receives the same [`GenerationRequest`] / [`ChatTurn`]
//! shapes and translates them to its vendor's wire format. Normalization
//! lives here so swapping providers never changes the conversational
//! semantics seen by the rest of the engine.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.5.0

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use std::collections::HashMap;

/// Canned user turn for unprompted generations
pub const SPONTANEOUS_NUDGE: &str = "(Send a casual message to the channel.)";
/// Canned user turn when the trigger carried attachments but no text
pub const ATTACHMENT_NUDGE: &str = "(Respond to the attached media as yourself.)";

/// Binary attachment carried by a request.
///
/// Owned exclusively by the request; dropped when the call chain returns.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn b64(&self) -> String {
        BASE64.encode(&self.data)
    }
}

/// Everything an adapter needs to produce a response. Immutable once built.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Triggering text; empty for spontaneous or attachment-only triggers
    pub prompt: String,
    pub system_prompt: String,
    /// Prior turns, oldest first
    pub context: Vec<ChatTurn>,
    pub attachments: Vec<Attachment>,
    pub channel_id: u64,
    pub guild_id: u64,
    /// Participant user id -> display name, for memory tools
    pub participants: HashMap<u64, String>,
}

/// One turn of conversation in the message sequence
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: TurnContent,
}

/// Turn content: plain text, or a complete adapter-specific wire message
/// (tool calls, tool results, image blocks). Structured turns pass through
/// normalization untouched and are never merged.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnContent {
    Text(String),
    Blocks(Value),
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        ChatTurn {
            role: "user".to_string(),
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        ChatTurn {
            role: "assistant".to_string(),
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn blocks(role: impl Into<String>, message: Value) -> Self {
        ChatTurn {
            role: role.into(),
            content: TurnContent::Blocks(message),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(t) => Some(t),
            TurnContent::Blocks(_) => None,
        }
    }
}

/// A tool invocation signaled by a provider response.
///
/// Created by an adapter, consumed by the tool executor within the same
/// round, never stored.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Unique within one generation round
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Enforce the role alternation strict vendors require.
///
/// Leading assistant turns are dropped (a conversation must open from the
/// human side); if every turn was from the assistant, the whole sequence is
/// replaced by the canned spontaneous turn. Adjacent same-role plain-text
/// turns are merged by newline-joining; structured turns are never merged,
/// only appended as siblings.
pub fn normalize_turns(turns: Vec<ChatTurn>) -> Vec<ChatTurn> {
    let start = match turns.iter().position(|t| t.role != "assistant") {
        Some(idx) => idx,
        None => return vec![ChatTurn::user(SPONTANEOUS_NUDGE)],
    };

    let mut merged: Vec<ChatTurn> = Vec::new();
    for turn in turns.into_iter().skip(start) {
        if let TurnContent::Text(text) = &turn.content {
            if let Some(prev) = merged.last_mut() {
                if prev.role == turn.role {
                    if let TurnContent::Text(prev_text) = &mut prev.content {
                        prev_text.push('\n');
                        prev_text.push_str(text);
                        continue;
                    }
                }
            }
        }
        merged.push(turn);
    }

    if merged.is_empty() {
        vec![ChatTurn::user(SPONTANEOUS_NUDGE)]
    } else {
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_drops_leading_assistant() {
        let turns = vec![
            ChatTurn::assistant("hi"),
            ChatTurn::assistant("again"),
            ChatTurn::user("hello"),
            ChatTurn::assistant("reply"),
        ];
        let normalized = normalize_turns(turns);
        assert_eq!(normalized[0], ChatTurn::user("hello"));
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn test_normalize_all_assistant_falls_back() {
        let turns = vec![ChatTurn::assistant("a"), ChatTurn::assistant("b")];
        let normalized = normalize_turns(turns);
        assert_eq!(normalized, vec![ChatTurn::user(SPONTANEOUS_NUDGE)]);
    }

    #[test]
    fn test_normalize_merges_adjacent_text() {
        let turns = vec![
            ChatTurn::user("one"),
            ChatTurn::user("two"),
            ChatTurn::assistant("three"),
            ChatTurn::assistant("four"),
        ];
        let normalized = normalize_turns(turns);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].text(), Some("one\ntwo"));
        assert_eq!(normalized[1].text(), Some("three\nfour"));
    }

    #[test]
    fn test_normalize_never_merges_blocks() {
        let block = json!({"role": "user", "content": [{"type": "image"}]});
        let turns = vec![
            ChatTurn::user("look at this"),
            ChatTurn::blocks("user", block.clone()),
            ChatTurn::blocks("user", block.clone()),
        ];
        let normalized = normalize_turns(turns);
        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[1].content, TurnContent::Blocks(block.clone()));
        assert_eq!(normalized[2].content, TurnContent::Blocks(block));
    }

    #[test]
    fn test_normalize_text_after_blocks_not_merged_into_them() {
        let block = json!({"role": "user", "content": []});
        let turns = vec![
            ChatTurn::blocks("user", block),
            ChatTurn::user("caption"),
        ];
        let normalized = normalize_turns(turns);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[1].text(), Some("caption"));
    }

    #[test]
    fn test_normalize_empty_input() {
        assert_eq!(
            normalize_turns(Vec::new()),
            vec![ChatTurn::user(SPONTANEOUS_NUDGE)]
        );
    }
}
