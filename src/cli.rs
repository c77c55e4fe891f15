use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ramana: a friendly chat companion in the terminal
#[derive(Debug, Parser)]
#[command(name = "ramana")]
#[command(version)]
#[command(about = "Chat with Ramana from the terminal", long_about = None)]
pub struct Args {
    /// Model name (default: config/model or the provider's default)
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Provider: google, huggingface or stub (default: config/provider or "google")
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Config file (default: ~/.config/ramana/config.toml)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Line-based chat on stdin/stdout
    Chat,

    /// Run an interactive terminal chat UI
    #[cfg(feature = "tui")]
    Tui,
}
