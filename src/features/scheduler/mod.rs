//! # Feature: Spontaneous Messages
//!
//! Sends 1-2 unprompted messages per day to configured channels at random
//! times. The next-run timestamp is persisted so restarts don't reroll
//! the schedule.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.6.0
//! - **Toggleable**: true (SPONTANEOUS_CHANNELS empty disables)

use anyhow::Result;
use log::{error, info, warn};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serenity::http::Http;
use serenity::model::id::ChannelId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::context::BotContext;
use crate::core::response;
use crate::features::chat::prompt::format_system_prompt;
use crate::providers::GenerationRequest;

const MIN_INTERVAL_SECS: f64 = 12.0 * 60.0 * 60.0;
const MAX_INTERVAL_SECS: f64 = 24.0 * 60.0 * 60.0;
const RETRY_SECS: u64 = 3600;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SchedulerState {
    #[serde(default)]
    next_run: f64,
}

pub struct SpontaneousScheduler {
    state: Arc<BotContext>,
    state_file: PathBuf,
}

impl SpontaneousScheduler {
    pub async fn new(state: Arc<BotContext>) -> Self {
        let data_dir = state.config.read().await.data_dir.clone();
        SpontaneousScheduler {
            state,
            state_file: data_dir.join("scheduler_state.json"),
        }
    }

    fn load_next_run(&self) -> Option<f64> {
        let raw = std::fs::read_to_string(&self.state_file).ok()?;
        let parsed: SchedulerState = serde_json::from_str(&raw).ok()?;
        (parsed.next_run > 0.0).then_some(parsed.next_run)
    }

    fn save_next_run(&self, timestamp: f64) {
        let state = SchedulerState { next_run: timestamp };
        if let Err(e) = serde_json::to_string(&state)
            .map_err(anyhow::Error::from)
            .and_then(|raw| std::fs::write(&self.state_file, raw).map_err(Into::into))
        {
            warn!("Failed to save scheduler state: {e}");
        }
    }

    pub async fn run(self, http: Arc<Http>) {
        info!("Spontaneous message scheduler started.");
        loop {
            let now = chrono::Utc::now().timestamp() as f64;
            let delay = match self.load_next_run() {
                Some(next_run) if next_run > now => {
                    info!("Next spontaneous message in {:.1} hours.", (next_run - now) / 3600.0);
                    next_run - now
                }
                _ => {
                    let delay = rand::rng().random_range(MIN_INTERVAL_SECS..MAX_INTERVAL_SECS);
                    self.save_next_run(now + delay);
                    info!("Scheduled spontaneous message in {:.1} hours.", delay / 3600.0);
                    delay
                }
            };

            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            self.save_next_run(0.0);

            if let Err(e) = self.send_spontaneous(&http).await {
                error!("Failed to send spontaneous message: {e}");
                tokio::time::sleep(Duration::from_secs(RETRY_SECS)).await;
            }
        }
    }

    async fn send_spontaneous(&self, http: &Http) -> Result<()> {
        let (channels, sample_size, persona_name, template) = {
            let config = self.state.config.read().await;
            (
                config.spontaneous_channels.clone(),
                config.llm_sample_size,
                config.persona_name.clone(),
                config.system_prompt_template.clone(),
            )
        };
        if channels.is_empty() {
            return Ok(());
        }

        let sampled = self.state.store.read().await.sample(sample_size);
        if sampled.is_empty() {
            return Ok(());
        }

        let channel_id = {
            let mut rng = rand::rng();
            ChannelId(*channels.choose(&mut rng).unwrap_or(&channels[0]))
        };

        let system_prompt = format_system_prompt(&template, &persona_name, &sampled, "", "");
        // No trigger at all: the engine substitutes the spontaneous nudge
        let request = GenerationRequest {
            prompt: String::new(),
            system_prompt,
            context: Vec::new(),
            attachments: Vec::new(),
            channel_id: channel_id.0,
            guild_id: 0,
            participants: HashMap::new(),
        };

        let engine = self.state.engine().await;
        let text = engine.generate(&request).await?;
        if !text.is_empty() {
            response::deliver(http, channel_id, None, &text).await?;
            info!("Sent spontaneous message to {channel_id}.");
        }
        Ok(())
    }
}
