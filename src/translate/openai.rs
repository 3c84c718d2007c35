use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{translation, ProviderError, Translation, Translator};
use crate::config::{MessagesConfig, OpenAiEndpointConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// System and user prompt pair shared by the model-based adapters.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system_message: String,
    pub user_message: String,
}

impl PromptTemplate {
    pub fn render(&self, text: &str) -> String {
        self.user_message.replace("{text}", text)
    }
}

impl From<&MessagesConfig> for PromptTemplate {
    fn from(messages: &MessagesConfig) -> Self {
        Self {
            system_message: messages.system_message.clone(),
            user_message: messages.user_message.clone(),
        }
    }
}

/// A single OpenAI-compatible chat completions endpoint.
pub struct OpenAiEndpoint {
    client: reqwest::Client,
    config: OpenAiEndpointConfig,
    prompt: PromptTemplate,
}

impl OpenAiEndpoint {
    pub fn new(
        config: OpenAiEndpointConfig,
        prompt: PromptTemplate,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            config,
            prompt,
        })
    }
}

#[async_trait]
impl Translator for OpenAiEndpoint {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn translate(&self, text: &str) -> Result<Translation, ProviderError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage::new("system", self.prompt.system_message.clone()),
                ChatMessage::new("user", self.prompt.render(text)),
            ],
        };

        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        debug!("Sending translation request to {} ({})", url, self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &error_body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unreachable(format!("invalid response: {}", e)))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::EmptyResponse)?;

        translation(&content, &self.config.model)
    }
}

/// The configured endpoints collapsed into one pipeline slot: tried in
/// order, first success wins.
pub struct OpenAiChain {
    endpoints: Vec<Box<dyn Translator>>,
}

impl OpenAiChain {
    pub fn new(endpoints: Vec<Box<dyn Translator>>) -> Self {
        Self { endpoints }
    }

    pub fn from_config(
        endpoints: &[OpenAiEndpointConfig],
        prompt: &PromptTemplate,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let endpoints = endpoints
            .iter()
            .map(|config| {
                OpenAiEndpoint::new(config.clone(), prompt.clone(), timeout)
                    .map(|endpoint| Box::new(endpoint) as Box<dyn Translator>)
            })
            .collect::<reqwest::Result<Vec<_>>>()?;
        Ok(Self::new(endpoints))
    }
}

#[async_trait]
impl Translator for OpenAiChain {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn translate(&self, text: &str) -> Result<Translation, ProviderError> {
        let mut last_error =
            ProviderError::Unreachable("no OpenAI endpoint configured".to_string());
        for endpoint in &self.endpoints {
            match endpoint.translate(text).await {
                Ok(t) => return Ok(t),
                Err(e) => {
                    warn!(
                        provider = endpoint.name(),
                        kind = e.kind(),
                        "OpenAI endpoint failed: {}",
                        e
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::FakeTranslator;

    fn prompt() -> PromptTemplate {
        PromptTemplate {
            system_message: "You are a translator.".to_string(),
            user_message: "Translate: {text}".to_string(),
        }
    }

    fn endpoint(base: &str) -> OpenAiEndpoint {
        OpenAiEndpoint::new(
            OpenAiEndpointConfig {
                section: "OpenAI1".to_string(),
                api_base: base.to_string(),
                model: "test-model".to_string(),
                key: "sk-test".to_string(),
            },
            prompt(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_render_substitutes_text() {
        assert_eq!(prompt().render("Bonjour"), "Translate: Bonjour");
    }

    #[tokio::test]
    async fn test_endpoint_returns_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "You are a translator."},
                    {"role": "user", "content": "Translate: Bonjour"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": " Hello \n"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let result = endpoint(&format!("{}/v1/", server.url()))
            .translate("Bonjour")
            .await
            .unwrap();
        assert_eq!(result.text, "Hello");
        assert_eq!(result.provider, "test-model");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_endpoint_auth_failure_is_unreachable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let err = endpoint(&server.url()).translate("Bonjour").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_endpoint_without_choices_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = endpoint(&server.url()).translate("Bonjour").await.unwrap_err();
        assert_eq!(err, ProviderError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_endpoint_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let err = endpoint(&server.url()).translate("Bonjour").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_chain_first_success_wins() {
        let e1 = FakeTranslator::failing("E1", ProviderError::EmptyResponse);
        let e2 = FakeTranslator::succeeding("E2", "from e2");
        let e3 = FakeTranslator::succeeding("E3", "from e3");
        let e3_calls = e3.calls();
        let chain = OpenAiChain::new(vec![Box::new(e1), Box::new(e2), Box::new(e3)]);

        let result = chain.translate("x").await.unwrap();
        assert_eq!(result.text, "from e2");
        assert_eq!(result.provider, "E2");
        assert_eq!(e3_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_returns_last_error() {
        let chain = OpenAiChain::new(vec![
            Box::new(FakeTranslator::failing("E1", ProviderError::EmptyResponse)),
            Box::new(FakeTranslator::failing(
                "E2",
                ProviderError::RateLimited("slow down".to_string()),
            )),
        ]);
        let err = chain.translate("x").await.unwrap_err();
        assert_eq!(err, ProviderError::RateLimited("slow down".to_string()));
    }
}
