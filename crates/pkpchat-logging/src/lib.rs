// Logging module - provider request logging and console diagnostics
pub mod request_logger;

use anyhow::{Context, Result};
use std::path::PathBuf;

pub use request_logger::{log_request, log_request_to_file, log_stream_chunk};

/// Safely truncate a string to a maximum number of characters
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        // Reserve space for "..." suffix
        let trunc_chars = if max_chars >= 3 { max_chars - 3 } else { 0 };
        format!("{}...", s.chars().take(trunc_chars).collect::<String>())
    }
}

/// Get or create the base pkpchat directory (~/.pkpchat)
/// Shared between request logging and session storage
pub fn get_pkpchat_dir() -> Result<PathBuf> {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Failed to get home directory")?;

    let pkpchat_dir = PathBuf::from(home_dir).join(".pkpchat");

    if !pkpchat_dir.exists() {
        std::fs::create_dir_all(&pkpchat_dir)
            .context("Failed to create pkpchat directory")?;
    }

    Ok(pkpchat_dir)
}

/// Get or create the logs directory (~/.pkpchat/logs)
pub fn get_logs_dir() -> Result<PathBuf> {
    let logs_dir = get_pkpchat_dir()?.join("logs");

    if !logs_dir.exists() {
        std::fs::create_dir_all(&logs_dir)
            .context("Failed to create logs directory")?;
    }

    Ok(logs_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate() {
        let long_text = "x".repeat(1000);
        let truncated = safe_truncate(&long_text, 100);
        assert_eq!(truncated.chars().count(), 100);
        assert!(truncated.ends_with("..."));

        let short_text = "Hello world";
        assert_eq!(safe_truncate(short_text, 100), short_text);
    }

    #[test]
    fn test_safe_truncate_multibyte() {
        let text = "🎨".repeat(50);
        let truncated = safe_truncate(&text, 10);
        assert_eq!(truncated.chars().count(), 10);
    }
}
