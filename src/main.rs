mod app;
mod assembler;
mod cli;
mod config;
mod conversation;
mod error;
mod paths;
mod provider;
mod render;
mod session;

#[cfg(feature = "tui")]
mod tui;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => paths::config_path()?,
    };
    let cfg = config::Config::load_optional(&config_path)?.unwrap_or_default();
    tracing::debug!(?config_path, provider = ?cfg.provider, model = ?cfg.model, "resolved config");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    // Credentials are checked here, before any turn exists.
    let session = app::build_session(&http, &args, &cfg)?;

    match args.cmd {
        Some(cli::Command::Chat) => return app::cmd_chat(&session, &cfg).await,
        #[cfg(feature = "tui")]
        Some(cli::Command::Tui) => return tui::run_tui(session, &cfg).await,
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: ramana \"Hello\" or `ramana chat`");
    }

    app::cmd_once(&session, &prompt).await
}
