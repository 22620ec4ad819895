// Features layer - all feature modules

pub mod admin;
pub mod chat;
pub mod corpus;
pub mod memory;
pub mod scheduler;
pub mod tools;

// Re-export feature items
pub use chat::ResponseScheduler;
pub use corpus::MessageStore;
pub use memory::MemoryStore;
pub use scheduler::SpontaneousScheduler;
pub use tools::ToolExecutor;
