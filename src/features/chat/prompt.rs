//! Prompt assembly: turns live channel state into a GenerationRequest.
//!
//! Rebuilt from scratch every time the debounce fires so the request
//! reflects the conversation as of the newest trigger, not the first.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.3.0
//!
//! ## Changelog
//! - 1.2.0: Memory sections and custom emoji listing
//! - 1.1.0: Re-slice history from the last direct @-mention
//! - 1.0.0: Initial release

use anyhow::Result;
use log::warn;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, GuildId, UserId};
use serenity::prelude::Context;
use std::collections::HashMap;

use crate::context::BotContext;
use crate::features::memory::MemoryStore;
use crate::providers::{Attachment, ChatTurn, GenerationRequest};

/// Format the system prompt template with persona name, sampled examples,
/// memories, and available custom emoji
pub fn format_system_prompt(
    template: &str,
    persona_name: &str,
    examples: &[String],
    memories: &str,
    custom_emojis: &str,
) -> String {
    template
        .replace("{name}", persona_name)
        .replace("{examples}", &examples.join("\n"))
        .replace("{memories}", memories)
        .replace("{custom_emojis}", custom_emojis)
}

/// Build the memory sections for the system prompt
pub fn format_memories(
    memory: &MemoryStore,
    channel_id: u64,
    participants: &HashMap<u64, String>,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    for (user_id, display_name) in participants {
        let (_, facts) = memory.get_user_facts(*user_id);
        if !facts.is_empty() {
            let lines: Vec<String> = facts.iter().map(|f| format!("- {f}")).collect();
            sections.push(format!(
                "What you know about {display_name}:\n{}",
                lines.join("\n")
            ));
        }
    }

    let channel_facts = memory.get_channel_facts(channel_id);
    if !channel_facts.is_empty() {
        let lines: Vec<String> = channel_facts.iter().map(|m| format!("- {m}")).collect();
        sections.push(format!(
            "What you know about this channel:\n{}",
            lines.join("\n")
        ));
    }

    if sections.is_empty() {
        String::new()
    } else {
        format!("{}\n\n", sections.join("\n"))
    }
}

/// List available custom emoji for the system prompt
pub fn guild_emoji_listing(ctx: &Context, guild_id: Option<GuildId>) -> String {
    let Some(guild_id) = guild_id else {
        return String::new();
    };
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return String::new();
    };

    let names: Vec<String> = guild
        .emojis
        .values()
        .filter(|e| e.available)
        .map(|e| format!(":{}:", e.name))
        .collect();
    if names.is_empty() {
        String::new()
    } else {
        format!(
            "Available custom emojis in this server: {}\n",
            names.join(", ")
        )
    }
}

/// Server nickname when present, else the account username
fn display_name(nick: Option<&str>, username: &str) -> String {
    nick.filter(|n| !n.is_empty()).unwrap_or(username).to_string()
}

/// The name the persona should use for a message's author
fn speaker_name(msg: &Message) -> String {
    display_name(
        msg.member.as_ref().and_then(|m| m.nick.as_deref()),
        &msg.author.name,
    )
}

/// Text annotations for a message's attachments
fn attachment_annotations(msg: &Message) -> String {
    msg.attachments
        .iter()
        .map(|att| {
            let is_image = att
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("image/"));
            if is_image {
                format!("[image: {}]", att.filename)
            } else {
                format!("[attached: {}]", att.filename)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert message history (oldest first) into role/text turns, prefixing
/// other speakers with their display names
pub fn build_context_turns(history: &[Message], bot_id: UserId) -> Vec<ChatTurn> {
    history
        .iter()
        .map(|m| {
            let mut content = m.content.clone();
            let annotations = attachment_annotations(m);
            if !annotations.is_empty() {
                if content.is_empty() {
                    content = annotations;
                } else {
                    content = format!("{content} {annotations}");
                }
            }
            if m.author.id == bot_id {
                ChatTurn::assistant(content)
            } else {
                ChatTurn::user(format!("{}: {}", speaker_name(m), content))
            }
        })
        .collect()
}

/// Most recent non-bot message in history (oldest first)
pub fn find_prompt_message(history: &[Message], bot_id: UserId) -> Option<&Message> {
    history
        .iter()
        .rev()
        .find(|m| m.author.id != bot_id && !m.author.bot)
}

/// Trim history to start from the last direct @-mention of the bot.
/// Replies carry an implicit mention and do not count.
pub fn slice_from_last_mention(history: Vec<Message>, bot_id: UserId) -> Vec<Message> {
    let mut start = 0;
    for (i, msg) in history.iter().enumerate() {
        if msg.mentions_user_id(bot_id) && msg.referenced_message.is_none() {
            start = i;
        }
    }
    history.into_iter().skip(start).collect()
}

/// Assemble a GenerationRequest from current channel state.
///
/// Returns the request and the prompt message (if any) for error reactions.
pub async fn build_request(
    ctx: &Context,
    state: &BotContext,
    channel_id: ChannelId,
    guild_id: Option<GuildId>,
) -> Result<(GenerationRequest, Option<Message>)> {
    let bot_id = ctx.cache.current_user_id();
    let (limit, sample_size, persona_name, template, memory_enabled) = {
        let config = state.config.read().await;
        (
            config.max_context_messages,
            config.llm_sample_size,
            config.persona_name.clone(),
            config.system_prompt_template.clone(),
            config.enable_memory,
        )
    };

    let mut history = channel_id
        .messages(&ctx.http, |retriever| retriever.limit(limit))
        .await?;
    history.reverse();
    let history = slice_from_last_mention(history, bot_id);

    // Keyed by the same display names the context turns use, so the
    // remember_user reverse lookup matches what the model sees
    let mut participants: HashMap<u64, String> = HashMap::new();
    for m in &history {
        if m.author.id != bot_id && !m.author.bot {
            participants.insert(m.author.id.0, speaker_name(m));
        }
    }

    let prompt_msg = find_prompt_message(&history, bot_id).cloned();
    let mut prompt_content = prompt_msg
        .as_ref()
        .map(|m| m.content.clone())
        .unwrap_or_default();

    // Context is everything before the prompt message
    let context_msgs: Vec<Message> = match &prompt_msg {
        Some(prompt) => history
            .iter()
            .take_while(|m| m.id != prompt.id)
            .cloned()
            .collect(),
        None => history.clone(),
    };

    // Images ride along as binary; text files are inlined; the rest is
    // annotated by filename only
    let mut attachments: Vec<Attachment> = Vec::new();
    if let Some(prompt) = &prompt_msg {
        for att in &prompt.attachments {
            let content_type = att.content_type.clone().unwrap_or_default();
            if content_type.starts_with("image/") {
                match att.download().await {
                    Ok(data) => attachments.push(Attachment {
                        filename: att.filename.clone(),
                        content_type,
                        data,
                    }),
                    Err(e) => warn!("Failed to download attachment {}: {e}", att.filename),
                }
            } else if content_type.starts_with("text/") {
                match att.download().await {
                    Ok(data) => {
                        let text = String::from_utf8_lossy(&data);
                        prompt_content.push_str(&format!("\n[File: {}]\n{text}", att.filename));
                    }
                    Err(e) => warn!("Failed to download attachment {}: {e}", att.filename),
                }
            } else {
                prompt_content.push_str(&format!("\n[Attached file: {}]", att.filename));
            }
        }
    }

    let context = build_context_turns(&context_msgs, bot_id);
    let sampled = state.store.read().await.sample(sample_size);

    let memories = if memory_enabled {
        format_memories(&state.memory, channel_id.0, &participants)
    } else {
        String::new()
    };
    let custom_emojis = guild_emoji_listing(ctx, guild_id);

    let system_prompt =
        format_system_prompt(&template, &persona_name, &sampled, &memories, &custom_emojis);

    let request = GenerationRequest {
        prompt: prompt_content,
        system_prompt,
        context,
        attachments,
        channel_id: channel_id.0,
        guild_id: guild_id.map(|g| g.0).unwrap_or_default(),
        participants,
    };
    Ok((request, prompt_msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_system_prompt_substitutes_placeholders() {
        let prompt = format_system_prompt(
            "You are {name}.\n{custom_emojis}{memories}Examples:\n{examples}",
            "casey",
            &["gm".to_string(), "lol".to_string()],
            "What you know:\n- stuff\n\n",
            "",
        );
        assert!(prompt.starts_with("You are casey."));
        assert!(prompt.contains("gm\nlol"));
        assert!(prompt.contains("- stuff"));
    }

    #[test]
    fn test_display_name_prefers_nick() {
        assert_eq!(display_name(Some("Cool Sam"), "sam123"), "Cool Sam");
        assert_eq!(display_name(None, "sam123"), "sam123");
        assert_eq!(display_name(Some(""), "sam123"), "sam123");
    }

    #[test]
    fn test_format_memories_empty_store() {
        let dir = std::env::temp_dir().join(format!("mimic_prompt_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let memory = MemoryStore::new(&dir).unwrap();
        let formatted = format_memories(&memory, 1, &HashMap::new());
        assert!(formatted.is_empty());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_format_memories_sections() {
        let dir = std::env::temp_dir().join(format!("mimic_prompt_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let memory = MemoryStore::new(&dir).unwrap();
        memory.add_user_fact(7, "sam", "likes karts").unwrap();
        memory.add_channel_fact(1, "pizza friday").unwrap();

        let participants = HashMap::from([(7_u64, "sam".to_string())]);
        let formatted = format_memories(&memory, 1, &participants);
        assert!(formatted.contains("What you know about sam:"));
        assert!(formatted.contains("- likes karts"));
        assert!(formatted.contains("What you know about this channel:"));
        assert!(formatted.contains("- pizza friday"));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
