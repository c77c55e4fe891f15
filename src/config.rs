use crate::provider::GenerationConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_ASSISTANT_NAME: &str = "Ramana";
pub const DEFAULT_PLACEHOLDER: &str = "Say something to Ramana...";
pub const DEFAULT_GREETING: &str = "Hey, I'm Ramana, your friendly personal companion 🤗. \
You can share anything with me: your thoughts, dreams, problems, or just chat casually. \
I'm always here to listen and talk like a friend 💬";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default model (provider default when unset).
    pub model: Option<String>,

    /// Provider identifier ("google", "huggingface", "stub").
    pub provider: Option<String>,

    pub assistant_name: String,

    /// First assistant turn of every session.
    pub greeting: String,

    /// Hint shown next to the input.
    pub placeholder: String,

    /// Simulated typing delay between fragments, in milliseconds.
    pub typing_delay_ms: u64,

    /// Send the greeting back to the provider as part of the context.
    pub include_greeting: bool,

    pub generation: GenerationConfig,

    /// Overrides for the provider's role strings.
    pub roles: RoleOverrides,

    pub google: GoogleConfig,
    pub huggingface: HuggingFaceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: None,
            provider: None,
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            typing_delay_ms: 0,
            include_greeting: true,
            generation: GenerationConfig::default(),
            roles: RoleOverrides::default(),
            google: GoogleConfig::default(),
            huggingface: HuggingFaceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RoleOverrides {
    pub user: Option<String>,
    pub assistant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GoogleConfig {
    /// Overridden by `GEMINI_API_KEY`.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HuggingFaceConfig {
    /// Overridden by `HF_TOKEN`.
    pub api_token: Option<String>,

    /// Inference endpoint base; the model id is appended.
    pub endpoint: Option<String>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let s = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }
}
