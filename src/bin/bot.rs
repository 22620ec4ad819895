use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};
use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::Arc;

use mimic::core::Config;
use mimic::features::{admin, chat, SpontaneousScheduler};
use mimic::BotContext;

struct Handler {
    state: Arc<BotContext>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.id == ctx.cache.current_user_id() {
            return;
        }

        // Admin commands run immediately; everything else goes through the
        // debounced chat path
        if admin::handle_command(&ctx, &self.state, &msg).await {
            return;
        }

        chat::on_message(ctx, self.state.clone(), msg).await;
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected and ready!", ready.user.name);
        info!("Connected to {} guilds", ready.guilds.len());
        info!("Bot ID: {}", ready.user.id);

        let corpus_size = self.state.store.read().await.count();
        if corpus_size == 0 {
            info!("Corpus is empty; the bot will stay silent until examples are uploaded.");
        } else {
            info!("Corpus loaded: {corpus_size} example messages");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Logger comes up before the config is parsed so validation warnings
    // for malformed env values are not lost
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level))
        .init();

    info!("Starting persona bot...");

    let config = Config::from_env()?;

    let state = BotContext::from_config(config)?;
    let token = state.config.read().await.discord_token.clone();

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(Handler {
            state: state.clone(),
        })
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    // Start the spontaneous message scheduler
    let spontaneous = SpontaneousScheduler::new(state).await;
    let http = client.cache_and_http.http.clone();
    tokio::spawn(async move {
        spontaneous.run(http).await;
    });

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
