//! Command Handler module for the slash commands
//!
//! Most commands operate on a quoted voice message: the user replies to an
//! earlier voice message with e.g. `/delete`, and the quoted message's file
//! id is the operand. The precondition is checked explicitly at the top of
//! each handler via [`quoted_voice_id`]; a missing quotation is reported to
//! the user, never silently ignored.

use anyhow::Result;
use log::{debug, error};
use teloxide::prelude::*;
use teloxide::types::{FileId, ParseMode};

use crate::converter::convert_to_ogg;
use crate::db::{MemeStore, NewMeme, StoreError};
use crate::dialogue::{validate_meme_name, MemeDialogue, MemeDialogueState};

use super::message_handler::{download_file, send_voice_clip};

const REPLY_TO_VOICE_HINT: &str =
    "Please use this command as a reply to the voice message of a meme.";

/// A slash command split into the command token and its argument tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub command: &'a str,
    pub args: &'a str,
}

/// Parse a text message as a slash command. Returns `None` for plain text.
pub fn parse_command(text: &str) -> Option<ParsedCommand<'_>> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let (head, args) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };

    // Group chats address commands as /command@BotName.
    let command = head.split('@').next().unwrap_or(head);

    Some(ParsedCommand { command, args })
}

/// Extract the voice file id of the message this one replies to.
pub fn quoted_voice_id(msg: &Message) -> Option<FileId> {
    msg.reply_to_message()
        .and_then(|quoted| quoted.voice())
        .map(|voice| voice.file.id.clone())
}

pub(crate) fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0 as i64)
}

pub async fn dispatch_command(
    bot: &Bot,
    msg: &Message,
    dialogue: &MemeDialogue,
    store: &MemeStore,
    cmd: ParsedCommand<'_>,
) -> Result<()> {
    match cmd.command {
        "/start" => cmd_start(bot, msg).await,
        "/help" => cmd_help(bot, msg).await,
        "/cancel" => cmd_cancel(bot, msg, dialogue).await,
        "/name" => cmd_name(bot, msg, store).await,
        "/delete" => cmd_delete(bot, msg, store).await,
        "/rename" => cmd_rename(bot, msg, store, cmd.args).await,
        "/fix" => cmd_fix(bot, msg, store).await,
        _ => {
            debug!("Unrecognized command {} in chat {}", cmd.command, msg.chat.id);
            Ok(())
        }
    }
}

async fn cmd_start(bot: &Bot, msg: &Message) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        "Hi! Send me a voice message or an audio file and I'll save it as a named voice meme.\n\n\
         Use /help to see everything I can do.",
    )
    .await?;
    Ok(())
}

async fn cmd_help(bot: &Bot, msg: &Message) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        "Send me a voice message, an audio file or an audio document to add a new meme.\n\n\
         Reply to a meme's voice message with one of these commands:\n\
         /name - show the meme's name\n\
         /delete - delete the meme (owner only)\n\
         /rename <new name> - rename the meme (owner only)\n\
         /fix - re-encode the meme if it doesn't play on some devices\n\n\
         /cancel - abort adding a meme\n\n\
         You can also search memes from any chat by typing my username followed by a name.",
    )
    .await?;
    Ok(())
}

/// Aborts the add-meme conversation, discarding the pending voice clip.
/// Only the user who started the conversation may abort it.
async fn cmd_cancel(bot: &Bot, msg: &Message, dialogue: &MemeDialogue) -> Result<()> {
    if let Some(MemeDialogueState::AwaitingName { user_id, .. }) = dialogue.get().await? {
        if sender_id(msg) != Some(user_id) {
            debug!(
                "/cancel from a non-initiating user in chat {}, keeping conversation",
                msg.chat.id
            );
            return Ok(());
        }
    }

    dialogue.exit().await?;
    bot.send_message(msg.chat.id, "Current operation has been canceled.")
        .await?;
    Ok(())
}

/// Returns the name of a meme.
async fn cmd_name(bot: &Bot, msg: &Message, store: &MemeStore) -> Result<()> {
    let Some(file_id) = quoted_voice_id(msg) else {
        bot.send_message(msg.chat.id, REPLY_TO_VOICE_HINT).await?;
        return Ok(());
    };

    match store.get_by_file_id(&file_id.0).await {
        Ok(meme) => {
            bot.send_message(msg.chat.id, meme.name).await?;
        }
        Err(StoreError::NotFound) => {
            bot.send_message(msg.chat.id, "I don't know that meme, sorry.")
                .await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Deletes a meme by its quoted voice message.
async fn cmd_delete(bot: &Bot, msg: &Message, store: &MemeStore) -> Result<()> {
    let Some(file_id) = quoted_voice_id(msg) else {
        bot.send_message(msg.chat.id, REPLY_TO_VOICE_HINT).await?;
        return Ok(());
    };
    let Some(requester) = sender_id(msg) else {
        debug!("/delete without a sender in chat {}", msg.chat.id);
        return Ok(());
    };

    let meme_name = match store.get_by_file_id(&file_id.0).await {
        Ok(meme) => meme.name,
        Err(StoreError::NotFound) => {
            bot.send_message(msg.chat.id, "I don't know that meme, sorry.")
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match store.delete_by_file_id(&file_id.0, requester).await {
        Ok(()) => {
            bot.send_message(
                msg.chat.id,
                format!("The meme \"{meme_name}\" has been deleted."),
            )
            .await?;
        }
        Err(StoreError::Unauthorized) => {
            bot.send_message(
                msg.chat.id,
                "Sorry, you can only delete the memes you added yourself.",
            )
            .await?;
        }
        Err(StoreError::NotFound) => {
            bot.send_message(msg.chat.id, "I don't know that meme, sorry.")
                .await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Preconditions of `/rename`, checked in order: the quoted voice message
/// first, then the new name.
#[derive(Debug, PartialEq)]
enum RenamePrecondition {
    MissingQuotedVoice,
    EmptyName,
    NameTooLong,
    Ready { file_id: String, name: String },
}

fn check_rename(quoted: Option<FileId>, args: &str) -> RenamePrecondition {
    let Some(file_id) = quoted else {
        return RenamePrecondition::MissingQuotedVoice;
    };

    match validate_meme_name(args) {
        Ok(name) => RenamePrecondition::Ready {
            file_id: file_id.0,
            name,
        },
        Err("too_long") => RenamePrecondition::NameTooLong,
        Err(_) => RenamePrecondition::EmptyName,
    }
}

/// Changes the name of a meme.
async fn cmd_rename(bot: &Bot, msg: &Message, store: &MemeStore, args: &str) -> Result<()> {
    let (file_id, new_name) = match check_rename(quoted_voice_id(msg), args) {
        RenamePrecondition::Ready { file_id, name } => (file_id, name),
        RenamePrecondition::MissingQuotedVoice => {
            bot.send_message(msg.chat.id, REPLY_TO_VOICE_HINT).await?;
            return Ok(());
        }
        RenamePrecondition::NameTooLong => {
            bot.send_message(msg.chat.id, "That name is too long, try a shorter one.")
                .await?;
            return Ok(());
        }
        RenamePrecondition::EmptyName => {
            bot.send_message(msg.chat.id, "Usage: /rename <i>new name</i>")
                .parse_mode(ParseMode::Html)
                .await?;
            return Ok(());
        }
    };

    let Some(requester) = sender_id(msg) else {
        debug!("/rename without a sender in chat {}", msg.chat.id);
        return Ok(());
    };

    let meme = match store.get_by_file_id(&file_id).await {
        Ok(meme) => meme,
        Err(StoreError::NotFound) => {
            bot.send_message(msg.chat.id, "Sorry, I don't know that meme.")
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match store.rename(meme.id, &new_name, requester).await {
        Ok(()) => {
            bot.send_message(
                msg.chat.id,
                format!("The meme has been renamed to \"{new_name}\"."),
            )
            .await?;
        }
        Err(StoreError::Unauthorized) => {
            bot.send_message(
                msg.chat.id,
                "Sorry, you can only rename the memes you added yourself.",
            )
            .await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Repairs a meme whose encoding doesn't play on some clients: the stored
/// record is replaced by a freshly converted upload under a new file id,
/// keeping the original name and owner.
async fn cmd_fix(bot: &Bot, msg: &Message, store: &MemeStore) -> Result<()> {
    let Some(file_id) = quoted_voice_id(msg) else {
        bot.send_message(msg.chat.id, REPLY_TO_VOICE_HINT).await?;
        return Ok(());
    };
    let Some(requester) = sender_id(msg) else {
        debug!("/fix without a sender in chat {}", msg.chat.id);
        return Ok(());
    };

    let meme = match store.get_by_file_id(&file_id.0).await {
        Ok(meme) => meme,
        Err(StoreError::NotFound) => {
            bot.send_message(msg.chat.id, "Sorry, I don't know that meme.")
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match store.delete_by_file_id(&meme.file_id, requester).await {
        Ok(()) => {}
        Err(StoreError::Unauthorized) => {
            bot.send_message(
                msg.chat.id,
                "Sorry, you can only fix the memes you added yourself.",
            )
            .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let audio = match download_file(bot, file_id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to download voice for /fix in chat {}: {e:?}", msg.chat.id);
            bot.send_message(msg.chat.id, "Sorry, I couldn't download that voice message.")
                .await?;
            return Ok(());
        }
    };

    let clip = match convert_to_ogg(&audio).await {
        Ok(clip) => clip,
        Err(e) => {
            error!("Failed to convert voice for /fix in chat {}: {e}", msg.chat.id);
            bot.send_message(msg.chat.id, "Sorry, I couldn't re-encode that voice message.")
                .await?;
            return Ok(());
        }
    };

    let fixed_file_id = send_voice_clip(bot, msg.chat.id, clip).await?;

    store
        .add(NewMeme {
            name: meme.name,
            file_id: fixed_file_id.0,
            owner_id: meme.owner_id,
        })
        .await?;

    bot.send_message(msg.chat.id, "The meme has been fixed.")
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_basic() {
        let cmd = parse_command("/name").unwrap();
        assert_eq!(cmd.command, "/name");
        assert_eq!(cmd.args, "");
    }

    #[test]
    fn test_parse_command_with_args() {
        let cmd = parse_command("/rename party horn").unwrap();
        assert_eq!(cmd.command, "/rename");
        assert_eq!(cmd.args, "party horn");
    }

    #[test]
    fn test_parse_command_strips_bot_mention() {
        let cmd = parse_command("/delete@VoiceMemeBot").unwrap();
        assert_eq!(cmd.command, "/delete");
        assert_eq!(cmd.args, "");

        let cmd = parse_command("/rename@VoiceMemeBot new name").unwrap();
        assert_eq!(cmd.command, "/rename");
        assert_eq!(cmd.args, "new name");
    }

    #[test]
    fn test_parse_command_trims_args() {
        let cmd = parse_command("/rename   spaced out  ").unwrap();
        assert_eq!(cmd.args, "spaced out");
    }

    #[test]
    fn test_parse_command_rejects_plain_text() {
        assert!(parse_command("hello there").is_none());
        assert!(parse_command("").is_none());
        assert!(parse_command("name /delete").is_none());
    }

    fn quoted(s: &str) -> Option<FileId> {
        Some(FileId(s.to_string()))
    }

    #[test]
    fn test_check_rename_quotation_before_name() {
        // A bare /rename with neither a quoted voice nor a name reports the
        // missing quotation, not the name usage hint.
        assert_eq!(
            check_rename(None, ""),
            RenamePrecondition::MissingQuotedVoice
        );
        assert_eq!(
            check_rename(None, "new name"),
            RenamePrecondition::MissingQuotedVoice
        );
    }

    #[test]
    fn test_check_rename_name_validation() {
        assert_eq!(check_rename(quoted("FILE1"), ""), RenamePrecondition::EmptyName);
        assert_eq!(
            check_rename(quoted("FILE1"), "   "),
            RenamePrecondition::EmptyName
        );
        assert_eq!(
            check_rename(quoted("FILE1"), &"a".repeat(256)),
            RenamePrecondition::NameTooLong
        );
    }

    #[test]
    fn test_check_rename_ready_trims_name() {
        assert_eq!(
            check_rename(quoted("FILE1"), "  party horn  "),
            RenamePrecondition::Ready {
                file_id: "FILE1".to_string(),
                name: "party horn".to_string(),
            }
        );
    }
}
