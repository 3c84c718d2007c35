use anyhow::Result;
use tracing::{error, info};

use crate::config::{Config, MessagesConfig};
use crate::phrases;
use crate::pipeline::{Pipeline, PipelineError};
use crate::platform::{IncomingPost, Outbound};
use crate::translate::truncate;

/// Telegram's limit for media captions, in UTF-16 code units
pub const CAPTION_MAX_LENGTH: usize = 1024;

/// How much of a post's text goes into log lines
const LOG_PREVIEW_LENGTH: usize = 120;

/// Formatting of the forwarded message.
#[derive(Debug, Clone, Default)]
pub struct OutboundFormat {
    pub include_source: bool,
    pub include_original: bool,
}

impl From<&MessagesConfig> for OutboundFormat {
    fn from(messages: &MessagesConfig) -> Self {
        Self {
            include_source: messages.include_source,
            include_original: messages.include_original,
        }
    }
}

/// Per-post orchestration: phrase filter, translation, outbound message.
/// Immutable after construction and shared across handler tasks.
pub struct Relay {
    pipeline: Pipeline,
    phrases: Vec<String>,
    format: OutboundFormat,
}

impl Relay {
    pub fn new(pipeline: Pipeline, phrases: Vec<String>, format: OutboundFormat) -> Self {
        Self {
            pipeline,
            phrases,
            format,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let phrases = phrases::load_phrases(&config.files.common_phrases)?;
        let pipeline = Pipeline::from_config(config)?;
        Ok(Self::new(
            pipeline,
            phrases,
            OutboundFormat::from(&config.messages),
        ))
    }

    /// Decide what to forward for `post`. `None` means the post is dropped.
    pub async fn handle(&self, post: &IncomingPost) -> Option<Outbound> {
        let source = post.source_label();
        let raw = post.text.as_deref().unwrap_or_default();

        if raw.trim().is_empty() && !post.has_media {
            info!("Post {} from {} has no text and no media, skipping", post.message_id, source);
            return None;
        }

        let filtered = phrases::filter(raw, &self.phrases);
        let filtered = filtered.trim();

        if filtered.is_empty() {
            if post.has_media {
                info!("Forwarding media post {} from {} without text", post.message_id, source);
                return Some(Outbound::Media {
                    caption: self.format.include_source.then(|| source_header(&source)),
                });
            }
            info!("Post {} from {} is empty after phrase removal, skipping", post.message_id, source);
            return None;
        }

        match self.pipeline.translate(filtered).await {
            Ok(translation) => {
                info!(
                    provider = %translation.provider,
                    "Translated post {} from {}",
                    post.message_id,
                    source
                );
                let body = self.compose(&source, &translation.text, filtered);
                Some(if post.has_media {
                    Outbound::Media {
                        caption: Some(truncate_caption(&body)),
                    }
                } else {
                    Outbound::Text(body)
                })
            }
            Err(PipelineError::AllProvidersExhausted { attempts }) => {
                let summary = attempts
                    .iter()
                    .map(|(name, e)| format!("{}: {}", name, e.kind()))
                    .collect::<Vec<_>>()
                    .join(", ");
                error!(
                    channel = %source,
                    text = %truncate(filtered, LOG_PREVIEW_LENGTH),
                    "All providers exhausted, dropping post {} [{}]",
                    post.message_id,
                    summary
                );
                None
            }
        }
    }

    fn compose(&self, source: &str, translated: &str, original: &str) -> String {
        let mut body = String::new();
        if self.format.include_source {
            body.push_str(&source_header(source));
            body.push_str("\n\n");
        }
        body.push_str(translated);
        if self.format.include_original {
            body.push_str("\n\nOriginal:\n");
            body.push_str(original);
        }
        body
    }
}

/// Cut a caption to Telegram's limit, which counts UTF-16 code units rather
/// than characters.
fn truncate_caption(text: &str) -> String {
    if text.encode_utf16().count() <= CAPTION_MAX_LENGTH {
        return text.to_string();
    }
    let budget = CAPTION_MAX_LENGTH - 3;
    let mut used = 0;
    let mut kept = String::new();
    for c in text.chars() {
        used += c.len_utf16();
        if used > budget {
            break;
        }
        kept.push(c);
    }
    kept.push_str("...");
    kept
}

fn source_header(source: &str) -> String {
    format!("From {}:", source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::FakeTranslator;
    use crate::translate::ProviderError;
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    fn post(text: Option<&str>, has_media: bool) -> IncomingPost {
        IncomingPost {
            channel: Some("news_channel".to_string()),
            chat_id: -1001,
            message_id: 42,
            text: text.map(str::to_string),
            has_media,
            date: Utc::now(),
        }
    }

    fn relay_with(
        adapters: Vec<Box<dyn crate::translate::Translator>>,
        phrases: &[&str],
        format: OutboundFormat,
    ) -> Relay {
        Relay::new(
            Pipeline::new(adapters),
            phrases.iter().map(|p| p.to_string()).collect(),
            format,
        )
    }

    #[tokio::test]
    async fn test_ad_signature_scenario() {
        let relay = relay_with(
            vec![Box::new(FakeTranslator::succeeding("A", "Hello world."))],
            &["[ad-signature]"],
            OutboundFormat::default(),
        );
        let out = relay
            .handle(&post(Some("Bonjour le monde. [ad-signature]"), false))
            .await;
        assert_eq!(out, Some(Outbound::Text("Hello world.".to_string())));
    }

    #[tokio::test]
    async fn test_no_translators_drops_post() {
        let relay = relay_with(Vec::new(), &[], OutboundFormat::default());
        assert_eq!(relay.handle(&post(Some("Bonjour"), false)).await, None);
    }

    #[tokio::test]
    async fn test_exhausted_drops_post() {
        let relay = relay_with(
            vec![Box::new(FakeTranslator::failing(
                "DeepL",
                ProviderError::Unreachable("down".to_string()),
            ))],
            &[],
            OutboundFormat::default(),
        );
        assert_eq!(relay.handle(&post(Some("Bonjour"), false)).await, None);
    }

    #[tokio::test]
    async fn test_empty_post_skipped_without_translation() {
        let a = FakeTranslator::succeeding("A", "x");
        let calls = a.calls();
        let relay = relay_with(vec![Box::new(a)], &["Subscribe"], OutboundFormat::default());

        assert_eq!(relay.handle(&post(None, false)).await, None);
        assert_eq!(relay.handle(&post(Some("  Subscribe "), false)).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_media_without_text_is_forwarded() {
        let a = FakeTranslator::succeeding("A", "x");
        let calls = a.calls();
        let relay = relay_with(vec![Box::new(a)], &[], OutboundFormat::default());

        let out = relay.handle(&post(None, true)).await;
        assert_eq!(out, Some(Outbound::Media { caption: None }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_media_caption_is_truncated() {
        let long = "word ".repeat(400);
        let relay = relay_with(
            vec![Box::new(FakeTranslator::succeeding("A", &long))],
            &[],
            OutboundFormat::default(),
        );
        let Some(Outbound::Media { caption: Some(caption) }) =
            relay.handle(&post(Some("mot"), true)).await
        else {
            panic!("expected a media caption");
        };
        assert_eq!(caption.encode_utf16().count(), CAPTION_MAX_LENGTH);
        assert!(caption.ends_with("..."));
    }

    #[test]
    fn test_caption_limit_counts_utf16_units() {
        // Each emoji is two UTF-16 code units.
        let emoji = "😀".repeat(CAPTION_MAX_LENGTH);
        let caption = truncate_caption(&emoji);
        assert!(caption.encode_utf16().count() <= CAPTION_MAX_LENGTH);
        assert_eq!(caption.chars().filter(|c| *c == '😀').count(), 510);
        assert!(caption.ends_with("..."));

        let fits = "😀".repeat(CAPTION_MAX_LENGTH / 2);
        assert_eq!(truncate_caption(&fits), fits);
    }

    #[tokio::test]
    async fn test_source_and_original_annotations() {
        let relay = relay_with(
            vec![Box::new(FakeTranslator::succeeding("A", "Hello"))],
            &[],
            OutboundFormat {
                include_source: true,
                include_original: true,
            },
        );
        let out = relay.handle(&post(Some(" Bonjour "), false)).await;
        assert_eq!(
            out,
            Some(Outbound::Text(
                "From @news_channel:\n\nHello\n\nOriginal:\nBonjour".to_string()
            ))
        );
    }
}
