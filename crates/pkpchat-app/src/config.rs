use anyhow::{Context, Result};
use std::path::PathBuf;

use pkpchat_api::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_IMAGE_MODEL};

use crate::cli::Cli;

/// Resolved application configuration: CLI flags layered over environment
/// variables layered over defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_url: String,
    pub chat_model: String,
    pub image_model: String,
    pub data_dir: PathBuf,
    pub storage_quota: Option<usize>,
    pub verbose: bool,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let api_key = cli
            .api_key
            .clone()
            .context("No API key configured. Set PKPCHAT_API_KEY or pass --api-key")?;

        let data_dir = match &cli.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => pkpchat_logging::get_pkpchat_dir()?.join("sessions"),
        };

        Ok(Self {
            api_key,
            api_url: cli
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chat_model: cli
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            image_model: cli
                .image_model
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            data_dir,
            storage_quota: cli.storage_quota,
            verbose: cli.verbose,
        })
    }

    /// Session inspection commands need the storage location but no API key.
    pub fn data_dir_from_cli(cli: &Cli) -> Result<PathBuf> {
        match &cli.data_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(pkpchat_logging::get_pkpchat_dir()?.join("sessions")),
        }
    }
}
