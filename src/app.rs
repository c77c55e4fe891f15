use crate::cli::Args;
use crate::config::Config;
use crate::conversation::RoleVocabulary;
use crate::provider::{self, Provider};
use crate::render::{RenderSurface, TerminalSurface};
use crate::session::{ChatSession, SessionSettings};
use anyhow::Context;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Provider chosen for this process, with its default model.
pub struct ProviderChoice {
    pub provider: Box<dyn Provider + Send + Sync>,
    pub default_model: &'static str,
}

/// Build the provider named `provider_name`.
///
/// A missing credential is fatal: no session can start without one.
pub fn build_provider(http: &reqwest::Client, cfg: &Config, provider_name: &str) -> anyhow::Result<ProviderChoice> {
    match provider_name {
        "google" => {
            #[cfg(feature = "google")]
            {
                let api_key = std::env::var("GEMINI_API_KEY")
                    .ok()
                    .or_else(|| cfg.google.api_key.clone())
                    .filter(|k| !k.trim().is_empty())
                    .context("No API key found. Set GEMINI_API_KEY or google.api_key in config.toml")?;
                let p = provider::google::GoogleProvider::new(http.clone(), api_key)?;
                Ok(ProviderChoice {
                    provider: Box::new(p),
                    default_model: provider::google::DEFAULT_MODEL,
                })
            }
            #[cfg(not(feature = "google"))]
            {
                let _ = (http, cfg);
                anyhow::bail!("google provider is not enabled in this build")
            }
        }
        "huggingface" => {
            #[cfg(feature = "huggingface")]
            {
                let token = std::env::var("HF_TOKEN")
                    .ok()
                    .or_else(|| cfg.huggingface.api_token.clone())
                    .filter(|k| !k.trim().is_empty())
                    .context("No access token found. Set HF_TOKEN or huggingface.api_token in config.toml")?;
                let p = provider::huggingface::HuggingFaceProvider::new(
                    http.clone(),
                    token,
                    cfg.huggingface.endpoint.as_deref(),
                )?;
                Ok(ProviderChoice {
                    provider: Box::new(p),
                    default_model: provider::huggingface::DEFAULT_MODEL,
                })
            }
            #[cfg(not(feature = "huggingface"))]
            {
                let _ = (http, cfg);
                anyhow::bail!("huggingface provider is not enabled in this build")
            }
        }
        "stub" => Ok(ProviderChoice {
            provider: Box::new(provider::stub::StubProvider::new()),
            default_model: "stub",
        }),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

/// Resolve settings from CLI flags over config over provider defaults.
pub fn resolve_settings(args: &Args, cfg: &Config, choice: &ProviderChoice) -> SessionSettings {
    let defaults = choice.provider.default_roles();
    let roles = RoleVocabulary {
        user: cfg.roles.user.clone().unwrap_or(defaults.user),
        assistant: cfg.roles.assistant.clone().unwrap_or(defaults.assistant),
    };

    let mut generation = cfg.generation.clone();
    if args.no_stream {
        generation.stream = false;
    }

    SessionSettings {
        model: args
            .model
            .clone()
            .or_else(|| cfg.model.clone())
            .unwrap_or_else(|| choice.default_model.to_string()),
        greeting: cfg.greeting.clone(),
        roles,
        generation,
        include_greeting: cfg.include_greeting,
        typing_delay: Duration::from_millis(cfg.typing_delay_ms),
    }
}

pub fn build_session(http: &reqwest::Client, args: &Args, cfg: &Config) -> anyhow::Result<ChatSession> {
    let provider_name = args
        .provider
        .clone()
        .or_else(|| cfg.provider.clone())
        .unwrap_or_else(|| "google".to_string());

    let choice = build_provider(http, cfg, &provider_name)?;
    let settings = resolve_settings(args, cfg, &choice);
    tracing::info!(provider = %provider_name, model = %settings.model, "session ready");
    Ok(ChatSession::new(choice.provider, settings))
}

/// Answer a single prompt and print only the reply.
pub async fn cmd_once(session: &ChatSession, prompt: &str) -> anyhow::Result<()> {
    session.initialize();
    let mut surface = TerminalSurface::new(std::io::stdout(), "").reply_only();
    session.submit(prompt, &mut surface).await?;
    Ok(())
}

/// Line-based chat: one line per message, replies streamed inline.
pub async fn cmd_chat(session: &ChatSession, cfg: &Config) -> anyhow::Result<()> {
    session.initialize();
    // The terminal already echoes what the user types.
    let mut surface = TerminalSurface::new(std::io::stdout(), cfg.assistant_name.clone()).without_user_echo();
    surface.redraw(&session.turns());
    eprintln!(
        "({} | {} via {}; Ctrl-D or /quit to leave)",
        cfg.placeholder,
        session.settings().model,
        session.provider_name()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim() == "/quit" {
            break;
        }
        match session.submit(&line, &mut surface).await {
            Ok(_) => {}
            Err(e) => eprintln!("({e})"),
        }
    }
    Ok(())
}
