use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use teloxide::payloads::CopyMessageSetters;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tracing::{debug, error, info, warn};

use crate::platform::{IncomingPost, Outbound};
use crate::relay::Relay;

/// Telegram rejects text messages above 4096 characters.
const MESSAGE_CHUNK_LENGTH: usize = 4000;

/// Group that receives the translated posts.
#[derive(Debug, Clone, Copy)]
pub struct Destination(pub ChatId);

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

fn has_media(msg: &Message) -> bool {
    msg.photo().is_some()
        || msg.video().is_some()
        || msg.animation().is_some()
        || msg.document().is_some()
        || msg.audio().is_some()
        || msg.voice().is_some()
        || msg.video_note().is_some()
}

fn to_incoming(msg: &Message) -> IncomingPost {
    IncomingPost {
        channel: msg.chat.username().map(str::to_string),
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        has_media: has_media(msg),
        date: msg.date,
    }
}

fn is_monitored(channels: &[String], username: &str) -> bool {
    channels
        .iter()
        .any(|channel| channel.eq_ignore_ascii_case(username))
}

/// Check the bot token and drop channels the bot cannot see.
pub async fn verify(bot: &Bot, channels: &[String]) -> Result<Vec<String>> {
    let me = bot
        .get_me()
        .await
        .context("Failed to reach Telegram with the configured bot token")?;
    info!("Logged in as @{}", me.username());

    let lookups = channels.iter().map(|channel| async move {
        let recipient = Recipient::ChannelUsername(format!("@{}", channel));
        (channel, bot.get_chat(recipient).await)
    });

    let mut resolved = Vec::new();
    for (channel, result) in join_all(lookups).await {
        match result {
            Ok(_) => {
                info!("Successfully resolved channel: @{}", channel);
                resolved.push(channel.clone());
            }
            Err(e) => error!("Error resolving channel '@{}': {}", channel, e),
        }
    }

    if resolved.is_empty() {
        bail!("No valid channels to listen to after resolving usernames");
    }
    Ok(resolved)
}

/// Subscribe to channel posts and relay them until the dispatcher stops.
pub async fn run(
    bot: Bot,
    relay: Arc<Relay>,
    channels: Vec<String>,
    destination: Destination,
) -> Result<()> {
    info!("Listening to channels: {:?}", channels);

    let handler = Update::filter_channel_post()
        .filter_map(move |msg: Message| {
            let username = msg.chat.username()?;
            if is_monitored(&channels, username) {
                Some(msg)
            } else {
                None
            }
        })
        .endpoint(handle_post);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay, destination])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_post(
    bot: Bot,
    msg: Message,
    relay: Arc<Relay>,
    destination: Destination,
) -> ResponseResult<()> {
    let started = Instant::now();
    let post = to_incoming(&msg);
    debug!(
        "Post {} in chat {} published at {}",
        post.message_id, post.chat_id, post.date
    );

    info!(
        "New post {} from {}: {}",
        post.message_id,
        post.source_label(),
        post.text.as_deref().unwrap_or("<media without text>")
    );

    let Some(outbound) = relay.handle(&post).await else {
        return Ok(());
    };

    match outbound {
        Outbound::Text(text) => {
            for chunk in split_message(&text, MESSAGE_CHUNK_LENGTH) {
                if let Err(e) = bot.send_message(destination.0, chunk).await {
                    error!("Failed to send message to the target group: {}", e);
                    return Ok(());
                }
            }
            info!("Message sent successfully");
        }
        Outbound::Media { caption } => {
            let mut request = bot.copy_message(destination.0, msg.chat.id, msg.id);
            if let Some(caption) = caption {
                request = request.caption(caption);
            }
            match request.await {
                Ok(_) => info!("Media and caption sent successfully"),
                Err(e) => error!("Failed to copy media to the target group: {}", e),
            }
        }
    }

    info!(
        "Post {} processed in {:.2} seconds",
        post.message_id,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_not_split() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn test_split_prefers_newline_then_space() {
        let chunks = split_message("aaaa\nbbbb cccc", 10);
        assert_eq!(chunks, vec!["aaaa\n", "bbbb cccc"]);

        let chunks = split_message("aaaa bbbb cccc", 10);
        assert_eq!(chunks, vec!["aaaa bbbb ", "cccc"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_monitored_channel_match_ignores_case() {
        let channels = vec!["News_Channel".to_string()];
        assert!(is_monitored(&channels, "news_channel"));
        assert!(!is_monitored(&channels, "other_channel"));
    }
}
