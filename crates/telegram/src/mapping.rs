//! Maps `teloxide::types::Message` onto the ingest crate's transport-agnostic
//! `IncomingMessage`, so the rest of the pipeline never sees a `teloxide`
//! type.

use sentrybot_ingest::IncomingMessage;
use teloxide::types::{Message, MessageId, MessageKind};

/// Collects the `file_id` of every media attachment on a message that the
/// context assembler might want to describe or download, preferring the
/// largest photo size.
fn media_file_refs(msg: &Message) -> Vec<String> {
    let mut refs = Vec::new();
    if let Some(sizes) = msg.photo() {
        if let Some(largest) = sizes.iter().max_by_key(|p| p.width * p.height) {
            refs.push(largest.file.id.to_string());
        }
    }
    if let Some(doc) = msg.document() {
        refs.push(doc.file.id.to_string());
    }
    if let Some(video) = msg.video() {
        refs.push(video.file.id.to_string());
    }
    if let Some(audio) = msg.audio() {
        refs.push(audio.file.id.to_string());
    }
    if let Some(voice) = msg.voice() {
        refs.push(voice.file.id.to_string());
    }
    if let Some(sticker) = msg.sticker() {
        refs.push(sticker.file.id.to_string());
    }
    if let Some(animation) = msg.animation() {
        refs.push(animation.file.id.to_string());
    }
    refs
}

/// `true` if the message text/caption mentions `@bot_username`, independent
/// of Telegram's parsed entity list (which isn't always populated in tests).
fn mentions_username(msg: &Message, bot_username: &str) -> bool {
    let needle = format!("@{bot_username}");
    msg.text()
        .or_else(|| msg.caption())
        .map(|text| text.contains(&needle))
        .unwrap_or(false)
}

fn is_reply_to_bot(msg: &Message, bot_user_id: teloxide::types::UserId) -> bool {
    msg.reply_to_message()
        .and_then(|reply| reply.from())
        .map(|user| user.id == bot_user_id)
        .unwrap_or(false)
}

fn reply_to_telegram_message_id(msg: &Message) -> Option<i64> {
    msg.reply_to_message().map(|reply| {
        let MessageId(id) = reply.id;
        id as i64
    })
}

/// Returns `None` for update kinds that carry no text/caption/media worth
/// ingesting (service messages, channel posts edited in place, etc).
pub fn from_teloxide(
    msg: &Message,
    bot_user_id: teloxide::types::UserId,
    bot_username: &str,
) -> Option<IncomingMessage> {
    if !matches!(msg.kind, MessageKind::Common(_)) {
        return None;
    }

    let text = msg.text().or_else(|| msg.caption()).map(|s| s.to_string());
    let has_media = !media_file_refs(msg).is_empty();
    if text.is_none() && !has_media {
        return None;
    }

    let from = msg.from();
    let MessageId(telegram_message_id) = msg.id;

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        thread_id: msg.thread_id.map(|t| t.0.0 as i64),
        user_id: from.map(|u| u.id.0 as i64),
        telegram_message_id: telegram_message_id as i64,
        display_name: from.map(|u| u.full_name()),
        username: from.and_then(|u| u.username.clone()),
        text,
        is_private: msg.chat.is_private(),
        is_reply_to_bot: is_reply_to_bot(msg, bot_user_id),
        mentions_bot_username: mentions_username(msg, bot_username),
        reply_to_telegram_message_id: reply_to_telegram_message_id(msg),
        media_group_id: msg.media_group_id().map(|s| s.to_string()),
        media_file_refs: media_file_refs(msg),
        ts: msg.date.timestamp(),
    })
}

#[cfg(test)]
mod tests {
    // `teloxide::types::Message` has no public constructor outside of
    // deserializing a Bot API payload, so mapping correctness is exercised
    // indirectly through `mentions_username`/`is_reply_to_bot`'s text-only
    // logic via the command router's tests instead of constructing fixtures
    // here.
}
