//! Command-line interface definitions.
//!
//! Secrets are normally supplied through the environment; every option can
//! also be passed as a flag.

use crate::models::Language;
use clap::Parser;

/// Command-line arguments for a digest run.
///
/// # Examples
///
/// ```sh
/// # Credentials from the environment, built-in settings
/// BOT_TOKEN=... CHAT_ID=@bourse GEMINI_API_KEY=... bourse_digest
///
/// # Custom settings file, print instead of sending
/// bourse_digest --config settings.yaml --dry-run
///
/// # Today only, English digest, JSON report
/// bourse_digest --window-days 1 --language en --report-dir ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Destination chat or channel identifier
    #[arg(long, env = "CHAT_ID")]
    pub chat_id: Option<String>,

    /// Gemini API key used for the narrative summary
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Optional path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Number of days in the date window, today included
    #[arg(long)]
    pub window_days: Option<u32>,

    /// Language of the digest
    #[arg(long, value_enum)]
    pub language: Option<Language>,

    /// Maximum listing pages visited per source
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Render proxy URL with a `{url}` placeholder, enables hardened sources
    #[arg(long, env = "RENDER_PROXY_URL")]
    pub render_proxy: Option<String>,

    /// Print the digest instead of delivering it
    #[arg(long)]
    pub dry_run: bool,

    /// Directory where the JSON run report is written
    #[arg(short, long)]
    pub report_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "bourse_digest",
            "--bot-token",
            "t",
            "--chat-id",
            "@bourse",
            "--gemini-api-key",
            "k",
            "--window-days",
            "1",
            "--language",
            "en",
        ]);

        assert_eq!(cli.chat_id.as_deref(), Some("@bourse"));
        assert_eq!(cli.window_days, Some(1));
        assert_eq!(cli.language, Some(Language::En));
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "bourse_digest",
            "-c",
            "/etc/bourse.yaml",
            "-r",
            "/tmp/reports",
            "--dry-run",
        ]);

        assert_eq!(cli.config.as_deref(), Some("/etc/bourse.yaml"));
        assert_eq!(cli.report_dir.as_deref(), Some("/tmp/reports"));
        assert!(cli.dry_run);
    }
}
