//! Shared bot state threaded through event handlers.
//!
//! Admin commands mutate the config, corpus, and active provider at
//! runtime, so those sit behind async RwLocks; readers take short-lived
//! guards and clone what they need. The memory store is always
//! constructed; whether the engine and prompt actually use it follows the
//! live `enable_memory` flag, so the toggle works in both directions at
//! runtime.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::Config;
use crate::features::chat::ResponseScheduler;
use crate::features::corpus::MessageStore;
use crate::features::memory::MemoryStore;
use crate::providers::{create_provider, GenerationEngine, Provider};

pub struct BotContext {
    pub config: RwLock<Config>,
    pub store: RwLock<MessageStore>,
    pub memory: Arc<MemoryStore>,
    pub provider: RwLock<Arc<dyn Provider>>,
    pub scheduler: Arc<ResponseScheduler>,
}

impl BotContext {
    pub fn from_config(config: Config) -> Result<Arc<Self>> {
        let store = MessageStore::new(&config.data_dir)?;
        let memory = Arc::new(MemoryStore::new(&config.data_dir)?);
        let provider = create_provider(&config.active_provider, &config)?;

        Ok(Arc::new(BotContext {
            config: RwLock::new(config),
            store: RwLock::new(store),
            memory,
            provider: RwLock::new(provider),
            scheduler: Arc::new(ResponseScheduler::new()),
        }))
    }

    /// Snapshot the current provider and toggles into a generation engine.
    /// Memory tools are only offered while `enable_memory` is on.
    pub async fn engine(&self) -> GenerationEngine {
        let provider = self.provider.read().await.clone();
        let (web_search_enabled, memory_enabled) = {
            let config = self.config.read().await;
            (config.enable_web_search, config.enable_memory)
        };
        let memory = memory_enabled.then(|| self.memory.clone());
        GenerationEngine::new(provider, memory, web_search_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_state(enable_memory: bool) -> (Arc<BotContext>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("mimic_context_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut config = Config::for_tests(dir.join(".env"));
        config.data_dir = dir.clone();
        config.enable_memory = enable_memory;
        (BotContext::from_config(config).unwrap(), dir)
    }

    #[tokio::test]
    async fn test_engine_follows_live_memory_toggle() {
        let (state, dir) = temp_state(true);

        let names: Vec<&str> = state
            .engine()
            .await
            .active_tools()
            .iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["remember_user", "remember_channel"]);

        // Turning memory off at runtime must withhold the tools
        state.config.write().await.enable_memory = false;
        assert!(state.engine().await.active_tools().is_empty());

        state.config.write().await.enable_memory = true;
        assert_eq!(state.engine().await.active_tools().len(), 2);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_memory_enabled_after_startup() {
        // Started with memory off, enabled later: tools must appear
        let (state, dir) = temp_state(false);
        assert!(state.engine().await.active_tools().is_empty());

        state.config.write().await.enable_memory = true;
        let names: Vec<&str> = state
            .engine()
            .await
            .active_tools()
            .iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["remember_user", "remember_channel"]);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
