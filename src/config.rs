use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

/// Matches `[OpenAI]`, `[OpenAI1]`, `[OpenAI2]`, ... sections and the
/// per-endpoint switches in `[Translators]`.
static OPENAI_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^OpenAI(\d*)$").expect("valid regex"));

/// Telegram public usernames: a letter followed by 4-31 word characters.
static CHANNEL_USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{4,31}$").expect("valid regex"));

/// A translation backend that can occupy a slot in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    DeepL,
    Google,
    DuckDuckGo,
}

impl ProviderKind {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "OpenAI" => Some(ProviderKind::OpenAi),
            "DeepL" => Some(ProviderKind::DeepL),
            "Google" => Some(ProviderKind::Google),
            "DuckDuckGo" => Some(ProviderKind::DuckDuckGo),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "OpenAI"),
            ProviderKind::DeepL => write!(f, "DeepL"),
            ProviderKind::Google => write!(f, "Google"),
            ProviderKind::DuckDuckGo => write!(f, "DuckDuckGo"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    pub bot_token: String,
    #[serde(default)]
    pub deepl_key: String,
}

/// One `[OpenAI<N>]` section.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OpenAiEndpointConfig {
    #[serde(skip)]
    pub section: String,
    pub api_base: String,
    pub model: String,
    pub key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesConfig {
    #[serde(default = "default_common_phrases")]
    pub common_phrases: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            common_phrases: default_common_phrases(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DuckDuckGoConfig {
    #[serde(default = "default_ddg_model")]
    pub model: String,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for DuckDuckGoConfig {
    fn default() -> Self {
        Self {
            model: default_ddg_model(),
            proxy: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
enum ChannelList {
    Joined(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize, Clone)]
struct RawChannelsConfig {
    channels: ChannelList,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub recipient_group_id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    pub system_message: String,
    pub user_message: String,
    /// Prefix forwarded posts with `From @channel:`.
    #[serde(default)]
    pub include_source: bool,
    /// Append the filtered source text below the translation.
    #[serde(default)]
    pub include_original: bool,
}

/// The resolved `[Translators]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorsConfig {
    /// Enabled providers, in the order their keys appear in the file.
    pub order: Vec<ProviderKind>,
    pub timeout: Duration,
}

impl Default for TranslatorsConfig {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            timeout: Duration::from_secs(default_timeout_secs()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "Credentials")]
    credentials: CredentialsConfig,
    #[serde(rename = "Files", default)]
    files: FilesConfig,
    #[serde(rename = "Translators", default)]
    translators: toml::Table,
    #[serde(rename = "DuckDuckGo", default)]
    duckduckgo: DuckDuckGoConfig,
    #[serde(rename = "Channels")]
    channels: RawChannelsConfig,
    #[serde(rename = "Telegram")]
    telegram: TelegramConfig,
    #[serde(rename = "Messages")]
    messages: MessagesConfig,
    /// Everything else; the `[OpenAI<N>]` sections are picked out of here.
    #[serde(flatten)]
    rest: toml::Table,
}

/// Immutable process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: CredentialsConfig,
    /// Enabled OpenAI-compatible endpoints in section-number order.
    pub openai: Vec<OpenAiEndpointConfig>,
    pub files: FilesConfig,
    pub translators: TranslatorsConfig,
    pub duckduckgo: DuckDuckGoConfig,
    /// Channel usernames without the leading `@`.
    pub channels: Vec<String>,
    pub telegram: TelegramConfig,
    pub messages: MessagesConfig,
}

fn default_common_phrases() -> PathBuf {
    PathBuf::from("common_phrases.txt")
}

fn default_ddg_model() -> String {
    "llama-3-70b".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        content
            .parse::<Config>()
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let mut sections: Vec<(u32, OpenAiEndpointConfig)> = Vec::new();
        for (name, value) in raw.rest {
            let Some(caps) = OPENAI_SECTION.captures(&name) else {
                warn!("Ignoring unknown config section [{}]", name);
                continue;
            };
            let number = caps[1].parse().unwrap_or(0);
            let mut endpoint = value
                .try_into::<OpenAiEndpointConfig>()
                .with_context(|| format!("Invalid section [{}]", name))?;
            endpoint.section = name;
            sections.push((number, endpoint));
        }
        sections.sort_by_key(|(number, _)| *number);

        let mut translators = TranslatorsConfig::default();
        let mut disabled_sections = Vec::new();
        for (key, value) in &raw.translators {
            if key == "timeout_secs" {
                let secs = value
                    .as_integer()
                    .filter(|secs| *secs > 0)
                    .context("[Translators] timeout_secs must be a positive integer")?;
                translators.timeout = Duration::from_secs(secs.unsigned_abs());
                continue;
            }
            let enabled = value
                .as_bool()
                .with_context(|| format!("[Translators] {} must be true or false", key))?;
            if let Some(kind) = ProviderKind::from_key(key) {
                if enabled {
                    translators.order.push(kind);
                }
            } else if OPENAI_SECTION.is_match(key) {
                if !enabled {
                    disabled_sections.push(key.clone());
                }
            } else {
                warn!("Ignoring unknown translator [Translators] {}", key);
            }
        }

        let openai = sections
            .into_iter()
            .map(|(_, endpoint)| endpoint)
            .filter(|endpoint| !disabled_sections.contains(&endpoint.section))
            .collect();

        let channels = match raw.channels.channels {
            ChannelList::Joined(joined) => split_channels(joined.split(',')),
            ChannelList::List(list) => split_channels(list.iter().map(String::as_str)),
        };

        let config = Config {
            credentials: raw.credentials,
            openai,
            files: raw.files,
            translators,
            duckduckgo: raw.duckduckgo,
            channels,
            telegram: raw.telegram,
            messages: raw.messages,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.credentials.bot_token.trim().is_empty() {
            bail!("[Credentials] bot_token must not be empty");
        }
        if self.channels.is_empty() {
            bail!("No channels specified in [Channels] channels");
        }
        let invalid: Vec<&str> = self
            .channels
            .iter()
            .filter(|channel| !CHANNEL_USERNAME.is_match(channel))
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            bail!("Invalid channel usernames in [Channels]: {:?}", invalid);
        }
        if !self.messages.user_message.contains("{text}") {
            bail!("[Messages] user_message must contain the {{text}} placeholder");
        }
        if self.is_enabled(ProviderKind::OpenAi) && self.openai.is_empty() {
            bail!("OpenAI translator is enabled but no [OpenAI<N>] endpoint is configured");
        }
        if self.is_enabled(ProviderKind::DeepL) && self.credentials.deepl_key.trim().is_empty() {
            bail!("DeepL translator is enabled but [Credentials] deepl_key is not set");
        }
        Ok(())
    }

    fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.translators.order.contains(&kind)
    }
}

impl std::str::FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content).context("Failed to parse config")?;
        Self::from_raw(raw)
    }
}

fn split_channels<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    names
        .map(|name| name.trim().trim_start_matches('@'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
