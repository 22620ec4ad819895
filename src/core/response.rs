//! Delivery pipeline: reaction extraction, Discord-safe chunking, and
//! human-paced sending
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.3.0
//!
//! ## Changelog
//! - 1.1.0: Added `[react: X]` marker extraction
//! - 1.0.0: Initial release with chunking and typing delays

use anyhow::Result;
use log::{debug, warn};
use rand::Rng;
use regex::Regex;
use serenity::http::Http;
use serenity::model::channel::{Message, ReactionType};
use serenity::model::id::ChannelId;
use std::sync::OnceLock;
use std::time::Duration;

/// Discord message content limit
pub const MESSAGE_LIMIT: usize = 2000;
/// Window searched for a natural split point before falling back to a hard cut
const SPLIT_SEARCH_WINDOW: usize = 1900;

static REACTION_MARKER: OnceLock<Option<Regex>> = OnceLock::new();

fn reaction_marker() -> Option<&'static Regex> {
    REACTION_MARKER
        .get_or_init(|| Regex::new(r"\[react:\s*([^\]]+)\]").ok())
        .as_ref()
}

/// Strip `[react: X]` markers from generated text.
///
/// Returns the deliverable text and the extracted reaction tokens in order
/// of appearance. Lines left empty by marker removal are dropped.
pub fn extract_reactions(text: &str) -> (String, Vec<String>) {
    let Some(re) = reaction_marker() else {
        return (text.trim().to_string(), Vec::new());
    };
    let reactions: Vec<String> = re
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    let stripped = re.replace_all(text, "");
    let deliverable = stripped
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    (deliverable, reactions)
}

/// Largest index `<= idx` that falls on a char boundary of `s`
fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Split text into Discord-safe chunks (<= 2000 bytes, UTF-8 safe).
///
/// Splitting priority: newlines -> sentence ends -> spaces -> hard cut.
pub fn chunk_response(text: &str) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let mut remaining = paragraph;
        while !remaining.is_empty() {
            if remaining.len() <= MESSAGE_LIMIT {
                chunks.push(remaining.to_string());
                break;
            }

            let window = floor_char_boundary(remaining, SPLIT_SEARCH_WINDOW);
            let head = &remaining[..window];

            // Prefer a sentence boundary, keeping the punctuation
            let mut split_idx = 0;
            for punc in [". ", "! ", "? "] {
                if let Some(idx) = head.rfind(punc) {
                    split_idx = split_idx.max(idx + 1);
                }
            }

            // Then any space
            if split_idx == 0 {
                split_idx = head.rfind(' ').unwrap_or(0);
            }

            // Hard cut at the limit
            if split_idx == 0 {
                split_idx = floor_char_boundary(remaining, MESSAGE_LIMIT);
            }

            chunks.push(remaining[..split_idx].trim().to_string());
            remaining = remaining[split_idx..].trim_start();
        }
    }

    chunks
}

/// Simulated typing delay for a chunk (~15 chars/sec, clamped to 1-5s)
pub fn typing_delay(text: &str) -> Duration {
    let base = 0.8 + text.chars().count() as f64 / 15.0;
    let jitter: f64 = rand::rng().random_range(-0.3..0.5);
    Duration::from_secs_f64((base + jitter).clamp(1.0, 5.0))
}

/// Chunk `text` and send each piece with a typing indicator and pacing delay
pub async fn send_chunked(http: &Http, channel_id: ChannelId, text: &str) -> Result<()> {
    for chunk in chunk_response(text) {
        // broadcast_typing shows the indicator for up to 10s, which covers
        // the clamped delay range
        if let Err(e) = channel_id.broadcast_typing(http).await {
            debug!("Failed to broadcast typing in {channel_id}: {e}");
        }
        tokio::time::sleep(typing_delay(&chunk)).await;
        channel_id.say(http, &chunk).await?;
    }
    Ok(())
}

/// Full delivery: extract reactions, react on the trigger (best-effort),
/// then send the remaining text in paced chunks
pub async fn deliver(
    http: &Http,
    channel_id: ChannelId,
    trigger: Option<&Message>,
    text: &str,
) -> Result<()> {
    let (deliverable, reactions) = extract_reactions(text);

    if let Some(msg) = trigger {
        for emoji in reactions {
            if let Err(e) = msg.react(http, ReactionType::Unicode(emoji.clone())).await {
                warn!("Failed to react with '{emoji}': {e}");
            }
        }
    }

    if !deliverable.is_empty() {
        send_chunked(http, channel_id, &deliverable).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(chunk_response("hello"), vec!["hello"]);
    }

    #[test]
    fn test_paragraphs_become_chunks() {
        let chunks = chunk_response("one\n\ntwo\nthree");
        assert_eq!(chunks, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_hard_cut_yields_three_chunks() {
        // 4500 chars, no punctuation or spaces: 2000 + 2000 + 500
        let text = "a".repeat(4500);
        let chunks = chunk_response(&text);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.len() <= MESSAGE_LIMIT);
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_sentence_boundary_preferred() {
        let mut text = "b".repeat(1500);
        text.push_str(". ");
        text.push_str(&"c".repeat(1000));
        let chunks = chunk_response(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with('.'));
        assert!(chunks[1].starts_with('c'));
    }

    #[test]
    fn test_space_boundary_fallback() {
        let mut text = "d".repeat(1500);
        text.push(' ');
        text.push_str(&"e".repeat(1000));
        let chunks = chunk_response(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 1500);
    }

    #[test]
    fn test_utf8_safety() {
        let text = "世界".repeat(2000);
        for chunk in chunk_response(&text) {
            assert!(chunk.len() <= MESSAGE_LIMIT);
            assert!(chunk.chars().count() > 0);
        }
    }

    #[test]
    fn test_extract_reactions_basic() {
        let (text, reactions) = extract_reactions("gm\n[react: 🔥]");
        assert_eq!(text, "gm");
        assert_eq!(reactions, vec!["🔥"]);
    }

    #[test]
    fn test_extract_reactions_none() {
        let (text, reactions) = extract_reactions("just a message");
        assert_eq!(text, "just a message");
        assert!(reactions.is_empty());
    }

    #[test]
    fn test_extract_reactions_inline() {
        let (text, reactions) = extract_reactions("lol [react: 😂] ok");
        assert_eq!(text, "lol  ok");
        assert_eq!(reactions, vec!["😂"]);
    }

    #[test]
    fn test_typing_delay_clamped() {
        for text in ["", "hi", "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"] {
            let delay = typing_delay(text);
            assert!(delay >= Duration::from_secs_f64(1.0));
            assert!(delay <= Duration::from_secs_f64(5.0));
        }
    }
}
