//! # Feature: Chat
//!
//! Decides when the persona speaks and owns the debounced response path.
//! A qualifying message cancels the channel's pending response and starts
//! a fresh debounce, so rapid multi-message thoughts get one reply built
//! from the newest state.
//!
//! - **Version**: 1.3.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.3.0: In-conversation follow-ups without an explicit mention
//! - 1.2.0: Random unprompted replies (REPLY_PROBABILITY)
//! - 1.1.0: Reply-reference detection with conversation expiry
//! - 1.0.0: Mention and DM triggers with debouncing

pub mod prompt;
pub mod scheduler;

pub use scheduler::ResponseScheduler;

use log::{debug, error, info};
use rand::Rng;
use serenity::model::channel::{Message, ReactionType};
use serenity::model::id::{ChannelId, GuildId};
use serenity::prelude::Context;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::context::BotContext;
use crate::core::response;

/// Seconds within which a reply to the bot counts as an active conversation
fn message_age_secs(msg: &Message) -> i64 {
    chrono::Utc::now().timestamp() - msg.timestamp.unix_timestamp()
}

fn is_mentioned(ctx: &Context, msg: &Message, conversation_expiry: f64) -> bool {
    let bot_id = ctx.cache.current_user_id();
    if msg.mentions_user_id(bot_id) {
        return true;
    }
    if let Some(referenced) = &msg.referenced_message {
        if referenced.author.id == bot_id {
            return (message_age_secs(referenced) as f64) < conversation_expiry;
        }
    }
    false
}

/// Did the bot speak recently in this channel? Checks the handful of
/// messages preceding the trigger for a fresh bot turn.
async fn in_conversation(ctx: &Context, msg: &Message, conversation_expiry: f64) -> bool {
    let bot_id = ctx.cache.current_user_id();
    let history = match msg
        .channel_id
        .messages(&ctx.http, |retriever| retriever.before(msg.id).limit(7))
        .await
    {
        Ok(history) => history,
        Err(e) => {
            debug!("Failed to fetch history for conversation check: {e}");
            return false;
        }
    };

    // Newest first; only the most recent bot message matters
    history
        .iter()
        .find(|m| m.author.id == bot_id)
        .map(|m| (message_age_secs(m) as f64) < conversation_expiry)
        .unwrap_or(false)
}

/// Inbound message hook: decide whether to respond and debounce the work
pub async fn on_message(ctx: Context, state: Arc<BotContext>, msg: Message) {
    if msg.author.bot || msg.author.id == ctx.cache.current_user_id() {
        return;
    }

    // Nothing to work with: an empty corpus never triggers a provider call
    if state.store.read().await.count() == 0 {
        return;
    }

    let (reply_probability, debounce_delay, conversation_expiry) = {
        let config = state.config.read().await;
        (
            config.reply_probability,
            config.debounce_delay,
            config.conversation_expiry,
        )
    };

    let is_dm = msg.guild_id.is_none();
    let mentioned = is_mentioned(&ctx, &msg, conversation_expiry);

    let mut qualifies = is_dm || mentioned;
    if !qualifies {
        qualifies = in_conversation(&ctx, &msg, conversation_expiry).await;
    }
    if !qualifies {
        qualifies = rand::rng().random_bool(reply_probability);
    }
    if !qualifies {
        return;
    }

    let channel_id = msg.channel_id;
    let guild_id = msg.guild_id;
    let scheduler = state.scheduler.clone();
    scheduler.schedule(
        channel_id.0,
        Duration::from_secs_f64(debounce_delay),
        respond(ctx, state, channel_id, guild_id),
    );
}

/// The debounced work: reassemble context from the latest channel state,
/// generate, deliver. Errors are logged and surfaced only as a reaction
/// marker; they never escape into the event loop.
async fn respond(
    ctx: Context,
    state: Arc<BotContext>,
    channel_id: ChannelId,
    guild_id: Option<GuildId>,
) {
    let request_id = Uuid::new_v4();

    let (request, prompt_msg) =
        match prompt::build_request(&ctx, &state, channel_id, guild_id).await {
            Ok(built) => built,
            Err(e) => {
                error!("[{request_id}] Failed to build request for {channel_id}: {e}");
                return;
            }
        };

    let engine = state.engine().await;
    match engine.generate(&request).await {
        Ok(text) if !text.is_empty() => {
            info!("[{request_id}] Responding in {channel_id} ({} chars)", text.len());
            if let Err(e) =
                response::deliver(&ctx.http, channel_id, prompt_msg.as_ref(), &text).await
            {
                error!("[{request_id}] Failed to deliver response: {e}");
            }
        }
        Ok(_) => {
            debug!("[{request_id}] Provider returned empty text");
            react_failure(&ctx, prompt_msg.as_ref()).await;
        }
        Err(e) => {
            error!("[{request_id}] Generation failed: {e}");
            react_failure(&ctx, prompt_msg.as_ref()).await;
        }
    }
}

/// Best-effort visible failure marker on the triggering message
async fn react_failure(ctx: &Context, prompt_msg: Option<&Message>) {
    if let Some(msg) = prompt_msg {
        let _ = msg
            .react(&ctx.http, ReactionType::Unicode("\u{26a0}\u{fe0f}".to_string()))
            .await;
    }
}
