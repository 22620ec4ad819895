//! # Core Module
//!
//! Configuration and the delivery pipeline shared by every feature.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Added response module with reaction extraction
//! - 1.0.0: Initial creation with config module

pub mod config;
pub mod response;

pub use config::{Config, DEFAULT_SYSTEM_PROMPT};
pub use response::{
    chunk_response, deliver, extract_reactions, send_chunked, typing_delay, MESSAGE_LIMIT,
};
