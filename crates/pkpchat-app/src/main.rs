use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use uuid::Uuid;

use pkpchat::app::{format_session_list, run_repl, App};
use pkpchat::cli::{Cli, Commands, SessionCommands};
use pkpchat::config::AppConfig;
use pkpchat_api::GeminiClient;
use pkpchat_storage::{FileStore, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Session maintenance commands work without provider credentials
    if let Some(Commands::Sessions { command }) = &cli.command {
        return run_sessions_command(&cli, command);
    }

    let config = AppConfig::from_cli(&cli)?;

    let store = match config.storage_quota {
        Some(quota) => FileStore::with_quota(&config.data_dir, quota),
        None => FileStore::new(&config.data_dir),
    }
    .with_context(|| format!("Failed to open data dir {}", config.data_dir.display()))?;

    let provider = GeminiClient::new(config.api_key.clone(), config.api_url.clone(), config.verbose)
        .with_models(config.chat_model.clone(), config.image_model.clone());

    let app = App::new(provider, SessionStore::new(store), config.verbose);
    run_repl(app).await
}

fn run_sessions_command(cli: &Cli, command: &SessionCommands) -> Result<()> {
    let data_dir = AppConfig::data_dir_from_cli(cli)?;
    let store = FileStore::new(&data_dir)
        .with_context(|| format!("Failed to open data dir {}", data_dir.display()))?;
    let mut store = SessionStore::new(store);
    let state = store.load();

    match command {
        SessionCommands::List => {
            for line in format_session_list(&state.sessions, state.active) {
                println!("{}", line);
            }
            for session in &state.sessions {
                println!("{}", format!("    {} -> {}", session.title, session.id).bright_black());
            }
        }
        SessionCommands::Delete { id } => {
            let id: Uuid = id.parse().context("Invalid session id")?;
            let mut sessions = state.sessions;
            let before = sessions.len();
            sessions.retain(|s| s.id != id);
            if sessions.len() == before {
                println!("No session with id {}", id);
                return Ok(());
            }

            let active = if state.active == id {
                pkpchat_chat::session::newest_session(&sessions)
            } else {
                Some(state.active)
            };
            store
                .save(&sessions, active)
                .context("Failed to save sessions")?;
            println!("Deleted session {}", id);
        }
    }

    Ok(())
}
