//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Routes incoming messages and runs the add-meme conversation
//! - `command_handler`: Handles the slash commands operating on quoted voice messages
//! - `inline_handler`: Answers inline queries with cached voice results

pub mod command_handler;
pub mod inline_handler;
pub mod message_handler;

// Re-export main handler functions for use in main.rs
pub use inline_handler::inline_query_handler;
pub use message_handler::message_handler;

// Re-export utility functions that might be used elsewhere
pub use command_handler::{parse_command, quoted_voice_id, ParsedCommand};
pub use message_handler::download_file;
