//! Inline query handler: lets users search and share memes from any chat.

use anyhow::Result;
use log::info;
use teloxide::prelude::*;
use teloxide::types::{FileId, InlineQuery, InlineQueryResult, InlineQueryResultCachedVoice};
use uuid::Uuid;

use crate::db::MemeStore;

/// At most this many results per inline query.
const INLINE_RESULT_LIMIT: usize = 10;

pub async fn inline_query_handler(bot: Bot, query: InlineQuery, store: MemeStore) -> Result<()> {
    let text = query.query.trim();
    info!("Inline query: {text}");

    let memes = if text.is_empty() {
        store.get_all().await?
    } else {
        store.find(text).await?
    };

    let results: Vec<InlineQueryResult> = memes
        .into_iter()
        .take(INLINE_RESULT_LIMIT)
        .map(|meme| {
            InlineQueryResult::CachedVoice(InlineQueryResultCachedVoice::new(
                Uuid::new_v4().to_string(),
                FileId(meme.file_id),
                meme.name,
            ))
        })
        .collect();

    // Memes get added, renamed and deleted often; stale cached results are
    // worse than the extra round trips.
    bot.answer_inline_query(query.id, results)
        .cache_time(0)
        .await?;

    Ok(())
}
