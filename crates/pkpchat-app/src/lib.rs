//! Application layer for pkpchat: CLI, configuration, the interactive REPL,
//! turn orchestration, and artifact export.

pub mod app;
pub mod cli;
pub mod config;
pub mod export;

pub use app::{run_repl, App};
pub use cli::{Cli, Commands, SessionCommands};
pub use config::AppConfig;
