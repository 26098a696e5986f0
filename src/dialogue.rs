//! Conversation state for the add-meme flow.

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

/// State of the add-meme conversation.
///
/// Entered when a user sends an audio clip that is not already a known meme;
/// the pending voice file id is held until that same user supplies a name.
/// `user_id` records who started the conversation, so text (and /cancel)
/// from other chat members does not complete or abort it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum MemeDialogueState {
    #[default]
    Start,
    AwaitingName {
        file_id: String,
        user_id: i64,
    },
}

/// Type alias for the add-meme dialogue.
pub type MemeDialogue = Dialogue<MemeDialogueState, InMemStorage<MemeDialogueState>>;

/// Validates a meme name input.
pub fn validate_meme_name(name: &str) -> Result<String, &'static str> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.len() > 255 {
        return Err("too_long");
    }

    Ok(trimmed.to_string())
}
