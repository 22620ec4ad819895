//! # Feature: Admin Commands
//!
//! Prefix (`!`) commands for the configured admin: corpus management,
//! memory inspection, provider switching, and live config updates. Slash
//! registration is deliberately avoided; these ride the plain message
//! event.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.4.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Memory inspection and forget commands
//! - 1.0.0: Corpus management, !set, !backend

use anyhow::Result;
use log::{info, warn};
use serenity::model::channel::Message;
use serenity::prelude::Context;
use std::sync::Arc;

use crate::context::BotContext;
use crate::core::response::MESSAGE_LIMIT;
use crate::providers::{create_provider, PROVIDER_NAMES};

const PAGE_SIZE: usize = 10;

const COMMANDS: &[&str] = &[
    "status",
    "reload",
    "upload",
    "messages",
    "remove",
    "clearmessages",
    "backend",
    "set",
    "memory",
    "forget",
    "help",
];

/// True when `content` invokes a known `!` command. Anything else,
/// including bare punctuation like `"!!!"`, is ordinary chat.
fn recognized_command(content: &str) -> bool {
    content
        .strip_prefix('!')
        .and_then(|rest| rest.split_whitespace().next())
        .is_some_and(|cmd| COMMANDS.contains(&cmd))
}

/// Handle an admin command. Returns true when the message was a command
/// (handled or rejected) so the chat path skips it.
pub async fn handle_command(ctx: &Context, state: &Arc<BotContext>, msg: &Message) -> bool {
    if !recognized_command(&msg.content) {
        return false;
    }

    let admin_id = state.config.read().await.admin_user_id;
    if msg.author.id.0 != admin_id {
        // Known commands from non-admins are swallowed, not answered
        return true;
    }

    let reply = match run_command(state, &msg.content).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return false, // not a recognised command; let chat see it
        Err(e) => format!("Error: {e}"),
    };

    for chunk in crate::core::chunk_response(&reply) {
        if let Err(e) = msg.channel_id.say(&ctx.http, chunk).await {
            warn!("Failed to send admin reply: {e}");
            break;
        }
    }

    // Attachment uploads piggyback on !upload and need http access
    if msg.content.trim() == "!upload" {
        if let Err(e) = upload_attachments(ctx, state, msg).await {
            let _ = msg.channel_id.say(&ctx.http, format!("Upload failed: {e}")).await;
        }
    }
    true
}

async fn run_command(state: &Arc<BotContext>, content: &str) -> Result<Option<String>> {
    let mut parts = content[1..].split_whitespace();
    let command = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    let reply = match command {
        "status" => {
            let config = state.config.read().await;
            let provider = state.provider.read().await;
            let count = state.store.read().await.count();
            format!(
                "Provider: {} | Examples: {} | Sample size: {} | Memory: {} | Web search: {}",
                provider.name(),
                count,
                config.llm_sample_size,
                if config.enable_memory { "on" } else { "off" },
                if config.enable_web_search { "on" } else { "off" },
            )
        }
        "reload" => {
            let mut store = state.store.write().await;
            store.reload()?;
            format!("Reloaded {} example messages.", store.count())
        }
        "upload" => "Reading attachments...".to_string(),
        "messages" => {
            let page: usize = args.first().and_then(|a| a.parse().ok()).unwrap_or(1).max(1);
            let store = state.store.read().await;
            let messages = store.list_messages();
            if messages.is_empty() {
                "No example messages stored.".to_string()
            } else {
                let start = (page - 1) * PAGE_SIZE;
                let entries: Vec<String> = messages
                    .iter()
                    .enumerate()
                    .skip(start)
                    .take(PAGE_SIZE)
                    .map(|(i, m)| {
                        let preview: String = m.chars().take(80).collect();
                        format!("{}. {}", i + 1, preview)
                    })
                    .collect();
                if entries.is_empty() {
                    format!("Page {page} is empty ({} messages total).", messages.len())
                } else {
                    format!(
                        "Messages {}-{} of {}:\n{}",
                        start + 1,
                        start + entries.len(),
                        messages.len(),
                        entries.join("\n")
                    )
                }
            }
        }
        "remove" => {
            let index: usize = args
                .first()
                .and_then(|a| a.parse().ok())
                .ok_or_else(|| anyhow::anyhow!("Usage: !remove <index>"))?;
            let removed = state.store.write().await.remove_message(index)?;
            format!("Removed: {removed}")
        }
        "clearmessages" => {
            let count = state.store.write().await.clear_messages()?;
            format!("Cleared {count} example messages.")
        }
        "backend" => {
            let name = args
                .first()
                .ok_or_else(|| anyhow::anyhow!("Usage: !backend <{}>", PROVIDER_NAMES.join("|")))?;
            // Config guard is released before the provider lock is taken;
            // the generate path acquires them in the opposite order
            let provider = {
                let mut config = state.config.write().await;
                let provider = create_provider(name, &config)?;
                config.update_env("ACTIVE_PROVIDER", name)?;
                provider
            };
            *state.provider.write().await = provider;
            info!("Switched provider to '{name}'.");
            format!("Switched provider to '{name}'.")
        }
        "set" => {
            let (key, value) = match args.as_slice() {
                [key, rest @ ..] if !rest.is_empty() => (*key, rest.join(" ")),
                _ => anyhow::bail!("Usage: !set <KEY> <VALUE>"),
            };
            state.config.write().await.update_env(key, &value)?;
            format!("Set {key}.")
        }
        "memory" => {
            if !state.config.read().await.enable_memory {
                anyhow::bail!("Memory is not enabled.");
            }
            let memory = &state.memory;
            match args.as_slice() {
                ["user", id] => {
                    let user_id: u64 = id.parse()?;
                    let (name, facts) = memory.get_user_facts(user_id);
                    if facts.is_empty() {
                        format!("No facts stored for {user_id}.")
                    } else {
                        let lines: Vec<String> = facts
                            .iter()
                            .enumerate()
                            .map(|(i, f)| format!("{i}. {f}"))
                            .collect();
                        format!("Facts about {name} ({user_id}):\n{}", lines.join("\n"))
                    }
                }
                ["channel", id] => {
                    let channel_id: u64 = id.parse()?;
                    let facts = memory.get_channel_facts(channel_id);
                    if facts.is_empty() {
                        format!("No memories stored for channel {channel_id}.")
                    } else {
                        let lines: Vec<String> = facts
                            .iter()
                            .enumerate()
                            .map(|(i, f)| format!("{i}. {f}"))
                            .collect();
                        format!("Channel {channel_id} memories:\n{}", lines.join("\n"))
                    }
                }
                _ => "Usage: !memory <user|channel> <id>".to_string(),
            }
        }
        "forget" => {
            if !state.config.read().await.enable_memory {
                anyhow::bail!("Memory is not enabled.");
            }
            let memory = &state.memory;
            match args.as_slice() {
                ["user", id, index] => {
                    let removed = memory.remove_user_fact(id.parse()?, index.parse()?)?;
                    format!("Forgot: {removed}")
                }
                ["user", id] => {
                    let count = memory.clear_user_facts(id.parse()?)?;
                    format!("Cleared {count} facts.")
                }
                ["channel", id, index] => {
                    let removed = memory.remove_channel_fact(id.parse()?, index.parse()?)?;
                    format!("Forgot: {removed}")
                }
                ["channel", id] => {
                    let count = memory.clear_channel_facts(id.parse()?)?;
                    format!("Cleared {count} memories.")
                }
                _ => "Usage: !forget <user|channel> <id> [index]".to_string(),
            }
        }
        "help" => [
            "!status, !reload, !upload (attach .txt), !messages [page],",
            "!remove <n>, !clearmessages, !backend <name>, !set <KEY> <VALUE>,",
            "!memory <user|channel> <id>, !forget <user|channel> <id> [index]",
        ]
        .join(" "),
        _ => return Ok(None),
    };

    // Keep admin replies within a single message where possible
    let mut reply = reply;
    if reply.len() > MESSAGE_LIMIT * 3 {
        reply.truncate(MESSAGE_LIMIT * 3);
    }
    Ok(Some(reply))
}

async fn upload_attachments(
    ctx: &Context,
    state: &Arc<BotContext>,
    msg: &Message,
) -> Result<()> {
    let mut added = 0;
    for att in &msg.attachments {
        if !att.filename.ends_with(".txt") {
            continue;
        }
        let data = att.download().await?;
        let text = String::from_utf8_lossy(&data);
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        added += state.store.write().await.add_messages(&lines)?;
    }

    let reply = if added > 0 {
        format!("Added {added} example messages.")
    } else {
        "No .txt attachments found.".to_string()
    };
    msg.channel_id.say(&ctx.http, reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_command_known_names() {
        assert!(recognized_command("!status"));
        assert!(recognized_command("!set KEY VALUE"));
        assert!(recognized_command("!messages 2"));
    }

    #[test]
    fn test_unrecognized_text_is_ordinary_chat() {
        // None of these may be intercepted; they must reach the chat path
        assert!(!recognized_command("!!!"));
        assert!(!recognized_command("!"));
        assert!(!recognized_command("!notacommand"));
        assert!(!recognized_command("hello"));
        assert!(!recognized_command(""));
    }
}
