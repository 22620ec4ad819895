//! # Feature: Persistent Memory
//!
//! Per-user and per-channel facts stored as JSON files under
//! `data/memories/`. Written by the `remember_user` / `remember_channel`
//! tools and folded into the system prompt on every generation. Retention
//! is capped; the oldest facts are evicted first.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.9.0
//! - **Toggleable**: true (ENABLE_MEMORY)

use anyhow::{bail, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum facts retained per user
pub const MAX_USER_FACTS: usize = 20;
/// Maximum memories retained per channel
pub const MAX_CHANNEL_MEMORIES: usize = 50;

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    facts: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChannelRecord {
    #[serde(default)]
    memories: Vec<String>,
}

/// JSON-file-backed store of user and channel memories
pub struct MemoryStore {
    users_dir: PathBuf,
    channels_dir: PathBuf,
}

impl MemoryStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let users_dir = data_dir.join("memories").join("users");
        let channels_dir = data_dir.join("memories").join("channels");
        std::fs::create_dir_all(&users_dir)?;
        std::fs::create_dir_all(&channels_dir)?;
        Ok(MemoryStore {
            users_dir,
            channels_dir,
        })
    }

    fn load<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
        if !path.exists() {
            return T::default();
        }
        match std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into))
        {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to load memory file {path:?}: {e}");
                T::default()
            }
        }
    }

    fn save<T: Serialize>(path: &Path, record: &T) -> Result<()> {
        let raw = serde_json::to_string_pretty(record)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    fn user_path(&self, user_id: u64) -> PathBuf {
        self.users_dir.join(format!("{user_id}.json"))
    }

    fn channel_path(&self, channel_id: u64) -> PathBuf {
        self.channels_dir.join(format!("{channel_id}.json"))
    }

    // -- User facts ----------------------------------------------------

    /// Return (display name, facts) for a user
    pub fn get_user_facts(&self, user_id: u64) -> (String, Vec<String>) {
        let record: UserRecord = Self::load(&self.user_path(user_id));
        (record.name, record.facts)
    }

    /// Add a fact about a user, refreshing their display name
    pub fn add_user_fact(&self, user_id: u64, name: &str, fact: &str) -> Result<()> {
        let mut record: UserRecord = Self::load(&self.user_path(user_id));
        record.name = name.to_string();
        record.facts.push(fact.to_string());
        let len = record.facts.len();
        if len > MAX_USER_FACTS {
            record.facts.drain(..len - MAX_USER_FACTS);
        }
        Self::save(&self.user_path(user_id), &record)
    }

    /// Remove a user fact by 0-based index, returning the removed text
    pub fn remove_user_fact(&self, user_id: u64, index: usize) -> Result<String> {
        let mut record: UserRecord = Self::load(&self.user_path(user_id));
        if index >= record.facts.len() {
            bail!("Index {index} out of range (have {} facts)", record.facts.len());
        }
        let removed = record.facts.remove(index);
        Self::save(&self.user_path(user_id), &record)?;
        Ok(removed)
    }

    /// Clear all facts for a user, returning the count removed
    pub fn clear_user_facts(&self, user_id: u64) -> Result<usize> {
        let mut record: UserRecord = Self::load(&self.user_path(user_id));
        let count = record.facts.len();
        record.facts.clear();
        Self::save(&self.user_path(user_id), &record)?;
        Ok(count)
    }

    // -- Channel memories ----------------------------------------------

    pub fn get_channel_facts(&self, channel_id: u64) -> Vec<String> {
        let record: ChannelRecord = Self::load(&self.channel_path(channel_id));
        record.memories
    }

    pub fn add_channel_fact(&self, channel_id: u64, memory: &str) -> Result<()> {
        let mut record: ChannelRecord = Self::load(&self.channel_path(channel_id));
        record.memories.push(memory.to_string());
        let len = record.memories.len();
        if len > MAX_CHANNEL_MEMORIES {
            record.memories.drain(..len - MAX_CHANNEL_MEMORIES);
        }
        Self::save(&self.channel_path(channel_id), &record)
    }

    pub fn remove_channel_fact(&self, channel_id: u64, index: usize) -> Result<String> {
        let mut record: ChannelRecord = Self::load(&self.channel_path(channel_id));
        if index >= record.memories.len() {
            bail!(
                "Index {index} out of range (have {} memories)",
                record.memories.len()
            );
        }
        let removed = record.memories.remove(index);
        Self::save(&self.channel_path(channel_id), &record)?;
        Ok(removed)
    }

    pub fn clear_channel_facts(&self, channel_id: u64) -> Result<usize> {
        let mut record: ChannelRecord = Self::load(&self.channel_path(channel_id));
        let count = record.memories.len();
        record.memories.clear();
        Self::save(&self.channel_path(channel_id), &record)?;
        Ok(count)
    }
}
