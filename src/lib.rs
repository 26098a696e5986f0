//! # Voice Meme Bot
//!
//! A Telegram bot that stores short voice clips ("memes") under user-chosen
//! names and serves them back via voice-message recognition, reply commands,
//! and inline search.

pub mod bot;
pub mod converter;
pub mod db;
pub mod dialogue;
