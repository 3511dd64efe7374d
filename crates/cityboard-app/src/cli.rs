//! CLI argument definitions for the Cityboard application.
//!
//! Uses `clap` with derive macros for argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cityboard_core::config::DashboardConfig;
use cityboard_core::types::DashboardQuery;

/// Cityboard: chat with a city assistant and browse city dashboards.
#[derive(Parser, Debug)]
#[command(name = "cityboard", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive conversation on stdin.
    Chat {
        /// Generation model, e.g. gemini-2.5-pro.
        #[arg(short = 'm', long)]
        model: Option<String>,
    },
    /// Resolve a dashboard and fetch all of its components.
    Dashboard {
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        index: Option<String>,
        /// Maximum number of components (1-12).
        #[arg(long)]
        limit: Option<u32>,
        /// Dashboard API base URL.
        #[arg(long = "base-url")]
        base_url: Option<String>,
        /// Print the final snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Manage the remembered API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// GET an arbitrary dashboard API path and print the JSON reply.
    Fetch {
        /// Path below the base URL, e.g. api/v1/dashboard.
        #[arg(long, default_value = "")]
        service: String,
        /// Query string, e.g. city=taipei.
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long = "base-url")]
        base_url: Option<String>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum KeyAction {
    /// Store a new key.
    Set {
        value: String,
        /// Keep the key out of the credential file and erase any stored one.
        #[arg(long = "no-remember")]
        no_remember: bool,
    },
    /// Remove the stored key.
    Clear,
    /// Show whether a key is stored.
    Status,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CITYBOARD_CONFIG env var > ~/.cityboard/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CITYBOARD_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Build the dashboard query from flags, falling back to configured defaults.
pub fn resolve_query(
    config: &DashboardConfig,
    city: Option<&str>,
    index: Option<&str>,
    limit: Option<u32>,
) -> DashboardQuery {
    DashboardQuery::new(
        city.unwrap_or(config.city.as_str()),
        index.unwrap_or(config.index.as_str()),
        limit.unwrap_or(config.limit),
    )
}

/// One line typed into the chat prompt.
#[derive(Debug, PartialEq)]
pub enum ChatInput {
    Quit,
    Reset,
    /// Empty line: send whatever is in the composer.
    SendDraft,
    /// `/n`, 1-based.
    Suggestion(usize),
    /// `/key <value>`
    SetKey(String),
    Text(String),
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => return ChatInput::SendDraft,
            "/quit" | "/exit" => return ChatInput::Quit,
            "/reset" => return ChatInput::Reset,
            _ => {}
        }
        if let Some(value) = line.strip_prefix("/key ") {
            return ChatInput::SetKey(value.trim().to_string());
        }
        if let Some(n) = line.strip_prefix('/').and_then(|n| n.parse::<usize>().ok()) {
            if n > 0 {
                return ChatInput::Suggestion(n);
            }
        }
        ChatInput::Text(line.to_string())
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    expand_with(path, home_dir())
}

fn expand_with(path: &str, home: Option<PathBuf>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var(var).ok().map(PathBuf::from)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".cityboard").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
