//! Cityboard application binary - composition root.
//!
//! Ties the Cityboard crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Build the reqwest gateway and the credential slot
//! 3. Run one subcommand: chat session, dashboard build, key management, or a raw fetch

mod cli;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use cityboard_chat::{
    ChatError, ConversationSession, GeminiGenerator, SendOutcome, SessionSnapshot,
};
use cityboard_core::config::{CityboardConfig, CredentialConfig};
use cityboard_core::types::{DashboardQuery, FetchState};
use cityboard_dashboard::{DashboardResolver, DashboardSnapshot, RunOutcome};
use cityboard_gateway::{
    build_preview_url, CredentialSlot, HttpGateway, ReqwestGateway, TomlFileStore,
};

use cli::{expand_home, resolve_query, ChatInput, CliArgs, Command, KeyAction};

type AppResult = Result<(), Box<dyn std::error::Error>>;

/// Longest chart payload echoed per component line.
const PREVIEW_CHARS: usize = 120;

fn open_credentials(
    config: &CredentialConfig,
) -> Result<CredentialSlot<TomlFileStore>, Box<dyn std::error::Error>> {
    let store = TomlFileStore::new(expand_home(&config.store_path));
    let mut slot = CredentialSlot::new(store, config.key.as_str(), config.remember);
    slot.load()?;
    Ok(slot)
}

// =============================================================================
// chat
// =============================================================================

/// Snapshot errors the transcript printer echoes: each change once, never
/// `MissingCredential` (the input loop prints every rejected send).
#[derive(Debug, Default)]
struct ErrorEcho {
    last: Option<ChatError>,
}

impl ErrorEcho {
    fn observe(&mut self, error: Option<&ChatError>) -> Option<String> {
        if error == self.last.as_ref() {
            return None;
        }
        self.last = error.cloned();
        match error {
            Some(ChatError::MissingCredential) | None => None,
            Some(err) => Some(error_line(err)),
        }
    }
}

fn error_line(err: &ChatError) -> String {
    format!("[error] {}", err)
}

/// Print transcript additions and errors as snapshots arrive.
async fn print_transcript(mut updates: WatchStream<SessionSnapshot>) {
    let mut printed = 0;
    let mut errors = ErrorEcho::default();
    let mut was_loading = false;

    while let Some(snapshot) = updates.next().await {
        if snapshot.transcript.len() < printed {
            println!("--- new conversation ---");
            printed = 0;
        }
        for message in &snapshot.transcript[printed..] {
            println!("[{}] {}", message.role, message.text);
        }
        printed = snapshot.transcript.len();

        if snapshot.loading && !was_loading {
            println!("...");
        }
        was_loading = snapshot.loading;

        if let Some(line) = errors.observe(snapshot.error.as_ref()) {
            println!("{}", line);
        }
    }
}

async fn run_chat(
    config: &CityboardConfig,
    gateway: Arc<dyn HttpGateway>,
    model: Option<String>,
) -> AppResult {
    let mut credentials = open_credentials(&config.credential)?;
    if credentials.current().is_none() {
        println!("No API key stored. Type `/key <KEY>` or run `cityboard key set <KEY>`.");
    }

    let generator = Arc::new(GeminiGenerator::new(gateway, config.chat.endpoint.clone()));
    let session = ConversationSession::new(generator, &config.chat);
    if let Some(model) = model {
        session.set_model(&model);
    }

    for (i, suggestion) in session.suggestions().iter().enumerate() {
        println!("/{} {}", i + 1, suggestion);
    }
    let printer = tokio::spawn(print_transcript(WatchStream::new(session.subscribe())));
    session.start(&config.chat.greeting, &config.chat.starter);
    tracing::info!(model = %session.model(), "Chat session ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let model = session.model();
        let outcome = match ChatInput::parse(&line) {
            ChatInput::Quit => break,
            ChatInput::Reset => {
                session.start(&config.chat.greeting, &config.chat.starter);
                continue;
            }
            ChatInput::SetKey(value) => {
                credentials.set(&value)?;
                println!("API key updated.");
                continue;
            }
            ChatInput::SendDraft => session.send_draft(credentials.current(), &model),
            ChatInput::Suggestion(n) => match session.suggestions().get(n - 1) {
                Some(text) => session.send(text, credentials.current(), &model),
                None => {
                    println!("No suggestion /{}.", n);
                    continue;
                }
            },
            ChatInput::Text(text) => session.send(&text, credentials.current(), &model),
        };

        match outcome {
            Ok(SendOutcome::Accepted(turn)) => {
                turn.wait().await;
            }
            Ok(SendOutcome::Ignored(reason)) => {
                tracing::debug!(?reason, "Input ignored");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Send rejected");
                println!("{}", error_line(&e));
            }
        }
    }

    printer.abort();
    Ok(())
}

// =============================================================================
// dashboard
// =============================================================================

fn preview(value: &serde_json::Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= PREVIEW_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Print whatever changed between two consecutive snapshots.
fn report_changes(previous: Option<&DashboardSnapshot>, next: &DashboardSnapshot) {
    let Some(query) = &next.query else {
        return;
    };
    let same_run = previous.is_some_and(|p| p.generation == next.generation);

    if !same_run || previous.map(|p| &p.index) != Some(&next.index) {
        match &next.index {
            FetchState::Idle => {}
            FetchState::Loading => println!("Resolving {} ...", query),
            FetchState::Success(components) => {
                let ids: Vec<String> = components.iter().map(|c| c.to_string()).collect();
                if components.is_empty() {
                    println!("No components found.");
                } else {
                    println!("{} component(s): {}", components.len(), ids.join(" "));
                }
            }
            FetchState::Failed(err) => println!("Index failed: {}", err),
        }
    }

    for (position, slot) in next.components.iter().enumerate() {
        let unchanged = same_run
            && previous
                .and_then(|p| p.components.get(position))
                .is_some_and(|p| p.state == slot.state);
        if unchanged {
            continue;
        }
        match &slot.state {
            FetchState::Idle => {}
            FetchState::Loading => println!("  {} loading", slot.component),
            FetchState::Success(value) => println!("  {} ok {}", slot.component, preview(value)),
            FetchState::Failed(err) => println!("  {} failed: {}", slot.component, err),
        }
    }
}

async fn run_dashboard(
    config: &CityboardConfig,
    gateway: Arc<dyn HttpGateway>,
    query: DashboardQuery,
    base_url: Option<String>,
    json: bool,
) -> AppResult {
    let base_url = base_url.unwrap_or_else(|| config.dashboard.base_url.clone());
    let resolver = DashboardResolver::new(gateway, &base_url);
    let mut updates = WatchStream::new(resolver.subscribe());
    let mut last: Option<DashboardSnapshot> = None;

    let run = resolver.build(query);
    let mut finished = std::pin::pin!(run.wait());
    let outcome = loop {
        tokio::select! {
            biased;
            Some(snapshot) = updates.next() => {
                report_changes(last.as_ref(), &snapshot);
                last = Some(snapshot);
            }
            outcome = &mut finished => break outcome,
        }
    };

    let snapshot = resolver.snapshot();
    report_changes(last.as_ref(), &snapshot);

    match &outcome {
        RunOutcome::Completed { succeeded, failed } => {
            tracing::info!(succeeded, failed, "Dashboard complete");
            println!("Done: {} ok, {} failed.", succeeded, failed);
        }
        RunOutcome::IndexFailed(err) => tracing::warn!(error = %err, "Dashboard index failed"),
        RunOutcome::Superseded => tracing::warn!("Dashboard build superseded"),
        RunOutcome::Aborted(reason) => println!("Dashboard build aborted: {}", reason),
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(())
}

// =============================================================================
// key / fetch
// =============================================================================

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

fn run_key(config: &CredentialConfig, action: KeyAction) -> AppResult {
    let mut credentials = open_credentials(config)?;
    match action {
        KeyAction::Set { value, no_remember } => {
            if no_remember || !config.remember {
                credentials.set_remember(false)?;
                credentials.set(&value)?;
                println!("API key not remembered; any stored key was erased.");
            } else {
                credentials.set_remember(true)?;
                credentials.set(&value)?;
                println!("API key stored in {}.", config.store_path);
            }
        }
        KeyAction::Clear => {
            credentials.forget()?;
            println!("API key cleared.");
        }
        KeyAction::Status => match credentials.current() {
            Some(key) => println!("API key: {} ({})", mask(key), config.store_path),
            None => println!("API key: not set"),
        },
    }
    Ok(())
}

async fn run_fetch(
    gateway: Arc<dyn HttpGateway>,
    base_url: &str,
    service: &str,
    query: &str,
) -> AppResult {
    let url = build_preview_url(base_url, service, query);
    println!("GET {}", url);
    let value = gateway.get(&url).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply.
    let config_file = args.resolve_config_path();
    let (config, config_error) = match CityboardConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (CityboardConfig::default(), Some(e)),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(args.resolve_log_level(&config.general.log_level))
            }),
        )
        .init();

    tracing::info!("Starting Cityboard v{}", env!("CARGO_PKG_VERSION"));
    match config_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) if config_file.exists() => {
            tracing::warn!(path = %config_file.display(), error = %e, "Invalid config, using defaults")
        }
        Some(_) => tracing::info!(path = %config_file.display(), "No config file, using defaults"),
    }

    let gateway: Arc<dyn HttpGateway> = Arc::new(ReqwestGateway::from_config(&config.gateway)?);

    let result = match args.command {
        Command::Chat { model } => run_chat(&config, gateway, model).await,
        Command::Dashboard {
            city,
            index,
            limit,
            base_url,
            json,
        } => {
            let query = resolve_query(&config.dashboard, city.as_deref(), index.as_deref(), limit);
            run_dashboard(&config, gateway, query, base_url, json).await
        }
        Command::Key { action } => run_key(&config.credential, action),
        Command::Fetch {
            service,
            query,
            base_url,
        } => {
            let base_url = base_url.unwrap_or_else(|| config.dashboard.base_url.clone());
            run_fetch(gateway, &base_url, &service, &query).await
        }
    };

    std::io::stdout().flush()?;
    result
}
