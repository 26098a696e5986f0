//! Message Handler module for processing incoming Telegram messages
//!
//! Routing is an explicit ordered chain, decided by [`route`]: slash commands
//! first, then the text reply of a pending add-meme conversation (only from
//! the user who started it), then recognition of known memes, then the
//! audio-upload entry point. Meme recognition deliberately runs before the
//! upload entry so an already-saved voice message never starts a new
//! conversation.

use anyhow::{anyhow, Result};
use log::{debug, error, info};
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile};

use crate::converter::convert_to_ogg;
use crate::db::{MemeStore, NewMeme};
use crate::dialogue::{validate_meme_name, MemeDialogue, MemeDialogueState};

use super::command_handler::{dispatch_command, parse_command, sender_id, ParsedCommand};

/// Download a Telegram file into memory.
pub async fn download_file(bot: &Bot, file_id: FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file.path
    );

    let response = reqwest::get(&url).await?;
    let bytes = response.bytes().await?;

    Ok(bytes.to_vec())
}

/// Send a converted clip back as a voice message and return the file id
/// Telegram assigns to the upload.
pub async fn send_voice_clip(bot: &Bot, chat_id: ChatId, clip: Vec<u8>) -> Result<FileId> {
    let sent = bot
        .send_voice(chat_id, InputFile::memory(clip).file_name("meme.ogg"))
        .await?;

    let voice = sent
        .voice()
        .ok_or_else(|| anyhow!("sent voice message has no voice attachment"))?;

    Ok(voice.file.id.clone())
}

/// An audio-like inbound message: either already in Telegram's native voice
/// format, or something that needs transcoding first.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AudioInput {
    Voice(FileId),
    NeedsConversion(FileId),
}

fn audio_input(msg: &Message) -> Option<AudioInput> {
    if let Some(voice) = msg.voice() {
        return Some(AudioInput::Voice(voice.file.id.clone()));
    }

    if let Some(audio) = msg.audio() {
        return Some(AudioInput::NeedsConversion(audio.file.id.clone()));
    }

    if let Some(doc) = msg.document() {
        let is_audio = doc
            .mime_type
            .as_ref()
            .is_some_and(|mime| mime.to_string().starts_with("audio/"));
        if is_audio {
            return Some(AudioInput::NeedsConversion(doc.file.id.clone()));
        }
    }

    None
}

/// What the router extracted from an inbound message before picking a handler.
pub(crate) struct Inbound<'a> {
    pub command: Option<ParsedCommand<'a>>,
    pub text: Option<&'a str>,
    pub voice_is_known_meme: bool,
    pub audio: Option<AudioInput>,
    pub sender: Option<i64>,
}

/// The handler an inbound message is routed to.
#[derive(Debug, PartialEq)]
pub(crate) enum Route<'a> {
    Command(ParsedCommand<'a>),
    MemeName,
    KnownMeme,
    AddMeme(AudioInput),
    Ignore,
}

/// The routing decision, as a pure function of the extracted message facts
/// and the conversation state.
pub(crate) fn route<'a>(inbound: Inbound<'a>, state: &MemeDialogueState) -> Route<'a> {
    // Commands work at any point, including mid-conversation (/cancel).
    if let Some(cmd) = inbound.command {
        return Route::Command(cmd);
    }

    // A pending conversation consumes the next plain text message as the
    // name, but only from the user who started it.
    if let MemeDialogueState::AwaitingName { user_id, .. } = state {
        if inbound.text.is_some() && inbound.sender == Some(*user_id) {
            return Route::MemeName;
        }
    }

    // A voice message that is already a known meme just gets its name echoed.
    if inbound.voice_is_known_meme {
        return Route::KnownMeme;
    }

    if let Some(audio) = inbound.audio {
        return Route::AddMeme(audio);
    }

    Route::Ignore
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    dialogue: MemeDialogue,
    store: MemeStore,
) -> Result<()> {
    let state = dialogue.get().await?.unwrap_or_default();

    let voice_is_known_meme = match msg.voice() {
        Some(voice) => store.exists(&voice.file.id.0).await?,
        None => false,
    };

    let inbound = Inbound {
        command: msg.text().and_then(parse_command),
        text: msg.text(),
        voice_is_known_meme,
        audio: audio_input(&msg),
        sender: sender_id(&msg),
    };

    match route(inbound, &state) {
        Route::Command(cmd) => dispatch_command(&bot, &msg, &dialogue, &store, cmd).await,
        Route::MemeName => match (state, msg.text()) {
            (MemeDialogueState::AwaitingName { file_id, user_id }, Some(text)) => {
                name_handler(&bot, &msg, &dialogue, &store, text, file_id, user_id).await
            }
            _ => Ok(()),
        },
        Route::KnownMeme => match msg.voice() {
            Some(voice) => meme_handler(&bot, &msg, &store, &voice.file.id.0).await,
            None => Ok(()),
        },
        Route::AddMeme(input) => audio_handler(&bot, &msg, &dialogue, input).await,
        Route::Ignore => {
            debug!(
                "Ignoring message without audio or conversation context in chat {}",
                msg.chat.id
            );
            Ok(())
        }
    }
}

/// Handles known memes, returns their names.
async fn meme_handler(bot: &Bot, msg: &Message, store: &MemeStore, file_id: &str) -> Result<()> {
    let meme = store.get_by_file_id(file_id).await?;
    info!("Recognized meme '{}' in chat {}", meme.name, msg.chat.id);

    bot.send_message(msg.chat.id, format!("Name: \"{}\"", meme.name))
        .await?;

    Ok(())
}

/// Entry point of the add-meme conversation. Non-voice audio is converted to
/// OGG/Opus and re-uploaded to obtain a voice file id.
async fn audio_handler(
    bot: &Bot,
    msg: &Message,
    dialogue: &MemeDialogue,
    input: AudioInput,
) -> Result<()> {
    let Some(user_id) = sender_id(msg) else {
        debug!("Audio message without a sender in chat {}", msg.chat.id);
        return Ok(());
    };

    let file_id = match input {
        AudioInput::Voice(file_id) => file_id,
        AudioInput::NeedsConversion(file_id) => {
            bot.send_message(msg.chat.id, "Converting to voice...")
                .await?;

            let audio = match download_file(bot, file_id).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to download audio in chat {}: {e:?}", msg.chat.id);
                    bot.send_message(msg.chat.id, "Sorry, I couldn't download that audio file.")
                        .await?;
                    return Ok(());
                }
            };

            let clip = match convert_to_ogg(&audio).await {
                Ok(clip) => clip,
                Err(e) => {
                    error!("Failed to convert audio in chat {}: {e}", msg.chat.id);
                    bot.send_message(
                        msg.chat.id,
                        "Sorry, I couldn't convert that file to a voice message.",
                    )
                    .await?;
                    return Ok(());
                }
            };

            send_voice_clip(bot, msg.chat.id, clip).await?
        }
    };

    dialogue
        .update(MemeDialogueState::AwaitingName {
            file_id: file_id.0,
            user_id,
        })
        .await?;

    bot.send_message(msg.chat.id, "Okay, now send me the name for the meme.")
        .await?;

    Ok(())
}

/// Second step of the conversation: the text message becomes the meme name.
/// Ownership goes to the user recorded at the start of the conversation.
async fn name_handler(
    bot: &Bot,
    msg: &Message,
    dialogue: &MemeDialogue,
    store: &MemeStore,
    text: &str,
    file_id: String,
    owner_id: i64,
) -> Result<()> {
    let name = match validate_meme_name(text) {
        Ok(name) => name,
        Err("too_long") => {
            bot.send_message(msg.chat.id, "That name is too long, try a shorter one.")
                .await?;
            return Ok(());
        }
        Err(_) => {
            bot.send_message(msg.chat.id, "The name cannot be empty. Send me another one.")
                .await?;
            return Ok(());
        }
    };

    store
        .add(NewMeme {
            name,
            file_id,
            owner_id,
        })
        .await?;

    bot.send_message(msg.chat.id, "Meme has been added.").await?;
    dialogue.exit().await?;

    Ok(())
}
