// Core layer - shared types, configuration, and delivery
pub mod core;

// Features layer - chat triggers, corpus, memory, tools, schedulers
pub mod features;

// Provider layer - LLM adapters and the generation engine
pub mod providers;

// Shared runtime state
pub mod context;

// Re-export core config
pub use core::Config;

// Re-export shared state
pub use context::BotContext;

// Re-export the most-used feature and provider items
pub use features::{MemoryStore, MessageStore, ResponseScheduler, SpontaneousScheduler};
pub use providers::{create_provider, GenerationEngine, GenerationRequest, Provider};
