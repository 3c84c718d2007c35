pub mod telegram;

use chrono::{DateTime, Utc};

/// A new post observed in one of the monitored channels
#[derive(Debug, Clone)]
pub struct IncomingPost {
    /// Channel username without the leading `@`, if the channel has one
    pub channel: Option<String>,
    /// Platform-specific chat ID
    pub chat_id: i64,
    /// Platform-specific message ID within the channel
    pub message_id: i32,
    /// Post text, or the media caption for media posts
    pub text: Option<String>,
    /// Whether the post carries a photo, video, document or similar
    pub has_media: bool,
    pub date: DateTime<Utc>,
}

impl IncomingPost {
    /// `@channel`, or a placeholder for channels without a public username
    pub fn source_label(&self) -> String {
        match &self.channel {
            Some(name) => format!("@{}", name),
            None => "Unknown Channel".to_string(),
        }
    }
}

/// What the relay wants delivered to the destination group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Plain text message
    Text(String),
    /// Copy of the original media post with a replacement caption
    Media { caption: Option<String> },
}
