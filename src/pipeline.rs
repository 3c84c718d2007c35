use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::{Config, ProviderKind};
use crate::translate::deepl::DeepL;
use crate::translate::duckduckgo::DuckDuckGoChat;
use crate::translate::google::GoogleTranslate;
use crate::translate::openai::{OpenAiChain, PromptTemplate};
use crate::translate::{ProviderError, Translation, Translator};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("all translation providers failed ({} attempted)", .attempts.len())]
    AllProvidersExhausted {
        /// Provider name and the reason it failed, in attempt order.
        attempts: Vec<(String, ProviderError)>,
    },
}

/// Ordered provider fallback chain. First success wins.
pub struct Pipeline {
    adapters: Vec<Box<dyn Translator>>,
}

impl Pipeline {
    pub fn new(adapters: Vec<Box<dyn Translator>>) -> Self {
        Self { adapters }
    }

    /// Build one adapter per enabled provider, in `[Translators]` order.
    pub fn from_config(config: &Config) -> Result<Self> {
        let prompt = PromptTemplate::from(&config.messages);
        let timeout = config.translators.timeout;

        let mut adapters: Vec<Box<dyn Translator>> = Vec::new();
        for kind in &config.translators.order {
            debug!("Enabling translator {}", kind);
            let adapter: Box<dyn Translator> = match kind {
                ProviderKind::OpenAi => Box::new(
                    OpenAiChain::from_config(&config.openai, &prompt, timeout)
                        .context("Failed to create OpenAI clients")?,
                ),
                ProviderKind::DeepL => Box::new(
                    DeepL::new(config.credentials.deepl_key.clone(), timeout)
                        .context("Failed to create DeepL client")?,
                ),
                ProviderKind::Google => Box::new(
                    GoogleTranslate::new(timeout).context("Failed to create Google client")?,
                ),
                ProviderKind::DuckDuckGo => Box::new(
                    DuckDuckGoChat::new(&config.duckduckgo, prompt.clone(), timeout)
                        .context("Failed to create DuckDuckGo client")?,
                ),
            };
            adapters.push(adapter);
        }

        if adapters.is_empty() {
            warn!("No translators enabled, every message will be dropped");
        } else {
            info!("Translation order: {}", Self::describe(&adapters));
        }

        Ok(Self::new(adapters))
    }

    fn describe(adapters: &[Box<dyn Translator>]) -> String {
        adapters
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub async fn translate(&self, text: &str) -> Result<Translation, PipelineError> {
        let mut attempts = Vec::new();
        for adapter in &self.adapters {
            debug!("Attempting translation with {}", adapter.name());
            let outcome = match adapter.translate(text).await {
                Ok(t) if t.text.trim().is_empty() => Err(ProviderError::EmptyResponse),
                other => other,
            };
            match outcome {
                Ok(translation) => {
                    info!(provider = %translation.provider, "Translation succeeded");
                    return Ok(translation);
                }
                Err(e) => {
                    warn!(
                        provider = adapter.name(),
                        kind = e.kind(),
                        "Translation failed: {}",
                        e
                    );
                    attempts.push((adapter.name().to_string(), e));
                }
            }
        }
        Err(PipelineError::AllProvidersExhausted { attempts })
    }
}
