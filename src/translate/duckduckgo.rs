use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::openai::{ChatMessage, PromptTemplate};
use super::{translation, ProviderError, Translation, Translator};
use crate::config::DuckDuckGoConfig;

const DUCKDUCKGO: &str = "https://duckduckgo.com";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Map the short model names accepted in the config onto DuckDuckGo's ids.
pub fn resolve_model(name: &str) -> &str {
    match name {
        "gpt-4o-mini" => "gpt-4o-mini",
        "claude-3-haiku" => "claude-3-haiku-20240307",
        "llama-3-70b" => "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
        "mixtral-8x7b" => "mistralai/Mixtral-8x7B-Instruct-v0.1",
        other => other,
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

/// One `data:` event of the chat stream.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

/// Concatenate the `message` fragments of a server-sent-event body.
fn collect_stream(body: &str) -> Result<String, ProviderError> {
    let mut reply = String::new();
    for line in body.lines() {
        let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
            continue;
        };
        if payload == "[DONE]" {
            break;
        }
        let Ok(event) = serde_json::from_str::<StreamEvent>(payload) else {
            continue;
        };
        if event.action.as_deref() == Some("error") {
            let detail = event.error_type.unwrap_or_else(|| "unknown error".to_string());
            return Err(if event.status == Some(429) {
                ProviderError::RateLimited(detail)
            } else {
                ProviderError::Unreachable(detail)
            });
        }
        if let Some(fragment) = event.message {
            reply.push_str(&fragment);
        }
    }
    Ok(reply)
}

/// Translation posed as a DuckDuckGo AI chat conversation.
pub struct DuckDuckGoChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    prompt: PromptTemplate,
}

impl DuckDuckGoChat {
    pub fn new(
        config: &DuckDuckGoConfig,
        prompt: PromptTemplate,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Self::with_base_url(config, prompt, timeout, DUCKDUCKGO.to_string())
    }

    pub fn with_base_url(
        config: &DuckDuckGoConfig,
        prompt: PromptTemplate,
        timeout: Duration,
        base_url: String,
    ) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT);
        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
            model: resolve_model(&config.model).to_string(),
            prompt,
        })
    }

    async fn fetch_vqd(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(format!("{}/duckchat/v1/status", self.base_url))
            .header("x-vqd-accept", "1")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        response
            .headers()
            .get("x-vqd-4")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Unreachable("missing x-vqd-4 token".to_string()))
    }
}

#[async_trait]
impl Translator for DuckDuckGoChat {
    fn name(&self) -> &str {
        "DuckDuckGo"
    }

    async fn translate(&self, text: &str) -> Result<Translation, ProviderError> {
        let vqd = self.fetch_vqd().await?;

        let content = format!("{} {}", self.prompt.system_message, self.prompt.render(text));
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(content),
            }],
        };

        debug!("Sending DuckDuckGo chat request ({})", self.model);

        let response = self
            .client
            .post(format!("{}/duckchat/v1/chat", self.base_url))
            .header("x-vqd-4", vqd)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited("chat throttled".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let body = response.text().await?;
        translation(&collect_stream(&body)?, self.name())
    }
}
