use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{translation, ProviderError, Translation, Translator};

const PRO_API: &str = "https://api.deepl.com";
const FREE_API: &str = "https://api-free.deepl.com";

/// DeepL responds 456 when the account's character quota is used up.
const QUOTA_EXCEEDED: u16 = 456;

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<TranslatedText>,
}

#[derive(Debug, Deserialize)]
struct TranslatedText {
    text: String,
}

/// DeepL REST API, always targeting English.
pub struct DeepL {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl DeepL {
    pub fn new(api_key: String, timeout: Duration) -> reqwest::Result<Self> {
        // Free-plan keys carry an `:fx` suffix and live on a separate host.
        let base_url = if api_key.ends_with(":fx") {
            FREE_API
        } else {
            PRO_API
        };
        Self::with_base_url(api_key, base_url.to_string(), timeout)
    }

    pub fn with_base_url(
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            api_key,
            base_url,
        })
    }
}

#[async_trait]
impl Translator for DeepL {
    fn name(&self) -> &str {
        "DeepL"
    }

    async fn translate(&self, text: &str) -> Result<Translation, ProviderError> {
        let url = format!("{}/v2/translate", self.base_url);
        debug!("Sending translation request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&[("text", text), ("target_lang", "EN")])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == QUOTA_EXCEEDED {
            return Err(ProviderError::RateLimited("quota exceeded".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unreachable(format!("invalid response: {}", e)))?;

        let first = body
            .translations
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;
        translation(&first.text, self.name())
    }
}
