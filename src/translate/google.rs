use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{translation, ProviderError, Translation, Translator};

const GTX_API: &str = "https://translate.googleapis.com";

/// Keyless Google Translate web endpoint (`client=gtx`), source language
/// auto-detected, target English.
pub struct GoogleTranslate {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslate {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        Self::with_base_url(GTX_API.to_string(), timeout)
    }

    pub fn with_base_url(base_url: String, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url,
        })
    }
}

/// The response is a nested array; element 0 lists sentence segments, each
/// `[translated, original, ...]`.
fn collect_segments(body: &Value) -> String {
    body.get(0)
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter_map(|segment| segment.get(0).and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Translator for GoogleTranslate {
    fn name(&self) -> &str {
        "Google"
    }

    async fn translate(&self, text: &str) -> Result<Translation, ProviderError> {
        let url = format!("{}/translate_a/single", self.base_url);
        debug!("Sending translation request to {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", "en"),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Unreachable(format!("invalid response: {}", e)))?;

        translation(&collect_segments(&body), self.name())
    }
}
