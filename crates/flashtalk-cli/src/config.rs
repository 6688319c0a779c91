//! Settings resolution for the CLI.
//!
//! Precedence, lowest first: built-in defaults, the TOML settings file,
//! then flags and `FLASHTALK_*` environment variables.

use std::path::Path;

use flashtalk_core::{EngineSettings, validate_settings};
use tracing::debug;

use crate::error::CliError;
use crate::parser::Cli;

/// Resolve and validate the settings for this invocation.
pub fn load_settings(cli: &Cli) -> Result<EngineSettings, CliError> {
    let mut settings = EngineSettings::with_defaults();
    if let Some(path) = cli.config.as_deref() {
        settings.overlay(&read_settings_file(path)?);
    }
    settings.overlay(&cli.overrides());
    validate_settings(&settings)?;

    debug!(
        api_base_url = %settings.effective_api_base_url(),
        voice_enabled = settings.effective_voice_enabled(),
        "Settings resolved"
    );
    Ok(settings)
}

/// Parse a TOML settings file. Missing keys stay unset.
pub fn read_settings_file(path: &Path) -> Result<EngineSettings, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    toml::from_str(&raw).map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn settings_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = settings_file("api_base_url = \"https://tutor.example/api/\"\n");
        let settings = read_settings_file(file.path()).unwrap();
        assert_eq!(settings.api_base_url.as_deref(), Some("https://tutor.example/api/"));
        assert_eq!(settings.request_timeout_secs, None);
    }

    #[test]
    fn test_flags_override_file() {
        let file = settings_file("request_timeout_secs = 45\nvoice_enabled = false\n");
        let path = file.path().to_str().unwrap();
        let cli = Cli::parse_from([
            "flashtalk",
            "--config",
            path,
            "--request-timeout",
            "12",
            "ask",
            "--card",
            "c",
            "--voice",
            "q",
        ]);

        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.effective_request_timeout_secs(), 12);
        assert!(settings.effective_voice_enabled());
        assert_eq!(
            settings.effective_api_base_url(),
            flashtalk_core::settings::DEFAULT_API_BASE_URL
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = settings_file("connect_timeout_secs = 0\n");
        let path = file.path().to_str().unwrap();
        let cli = Cli::parse_from(["flashtalk", "--config", path, "interrupt", "s-1"]);
        let err = load_settings(&cli).unwrap_err();
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let file = settings_file("voice_enabled = \"sometimes\"\n");
        assert!(matches!(
            read_settings_file(file.path()),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_settings_file(Path::new("/nonexistent/flashtalk.toml")).unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }
}
