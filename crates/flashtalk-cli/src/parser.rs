//! Main CLI parser and top-level argument handling.
//!
//! Global options double as settings overrides: each one can come from a
//! flag or from its `FLASHTALK_*` environment variable (a `.env` file is
//! loaded before parsing).

use std::path::PathBuf;

use clap::Parser;
use flashtalk_core::EngineSettings;

use crate::commands::Commands;

/// Command-line interface for the flashtalk streaming engine.
#[derive(Parser, Debug)]
#[command(name = "flashtalk")]
#[command(about = "Ask about a flashcard and stream the answer")]
#[command(version)]
pub struct Cli {
    /// TOML settings file
    #[arg(long, global = true, env = "FLASHTALK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the session API
    #[arg(long = "api-base-url", global = true, env = "FLASHTALK_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Bearer token for the session API
    #[arg(
        long = "auth-token",
        global = true,
        env = "FLASHTALK_AUTH_TOKEN",
        hide_env_values = true
    )]
    pub auth_token: Option<String>,

    /// Timeout in seconds for init and interrupt calls
    #[arg(long = "request-timeout", global = true, env = "FLASHTALK_REQUEST_TIMEOUT")]
    pub request_timeout_secs: Option<u64>,

    /// Timeout in seconds for establishing a connection
    #[arg(long = "connect-timeout", global = true, env = "FLASHTALK_CONNECT_TIMEOUT")]
    pub connect_timeout_secs: Option<u64>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Settings given on the command line or through the environment.
    pub fn overrides(&self) -> EngineSettings {
        EngineSettings {
            api_base_url: self.api_base_url.clone(),
            auth_token: self.auth_token.clone(),
            request_timeout_secs: self.request_timeout_secs,
            connect_timeout_secs: self.connect_timeout_secs,
            voice_enabled: self.command.voice_override(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args_become_overrides() {
        let cli = Cli::parse_from([
            "flashtalk",
            "--api-base-url",
            "https://tutor.example/api",
            "--request-timeout",
            "5",
            "ask",
            "--card",
            "card-7",
            "--voice",
            "Explain card",
        ]);

        let overrides = cli.overrides();
        assert_eq!(
            overrides.api_base_url.as_deref(),
            Some("https://tutor.example/api")
        );
        assert_eq!(overrides.request_timeout_secs, Some(5));
        assert_eq!(overrides.connect_timeout_secs, None);
        assert_eq!(overrides.voice_enabled, Some(true));
    }

    #[test]
    fn test_verbose_after_subcommand() {
        let cli = Cli::parse_from(["flashtalk", "interrupt", "session-1", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.overrides().voice_enabled, None);
    }
}
