use clap::{Parser, Subcommand};

/// CLI arguments for pkpchat
#[derive(Parser)]
#[command(name = "pkpchat")]
#[command(about = "PKP Chat - chat, image generation and slide decks backed by a generative AI provider")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// API key for the generation provider
    #[arg(long, value_name = "KEY", env = "PKPCHAT_API_KEY")]
    pub api_key: Option<String>,

    /// Base URL of the generation provider
    #[arg(long, value_name = "URL", env = "PKPCHAT_API_URL")]
    pub api_url: Option<String>,

    /// Override the chat/presentation model
    #[arg(long, value_name = "MODEL", env = "PKPCHAT_MODEL")]
    pub model: Option<String>,

    /// Override the image-generation model
    #[arg(long, value_name = "MODEL", env = "PKPCHAT_IMAGE_MODEL")]
    pub image_model: Option<String>,

    /// Directory holding persisted sessions (default: ~/.pkpchat/sessions)
    #[arg(long, value_name = "DIR", env = "PKPCHAT_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Storage budget in bytes; oldest sessions are evicted when exceeded
    #[arg(long, value_name = "BYTES", env = "PKPCHAT_STORAGE_QUOTA")]
    pub storage_quota: Option<usize>,

    /// Enable verbose debug output (shows provider requests, stream chunks, etc.)
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or prune saved sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List saved sessions
    List,
    /// Delete a saved session by id
    Delete {
        /// Session id (as shown by `sessions list`)
        id: String,
    },
}
