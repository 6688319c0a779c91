//! Settings domain types and validation.
//!
//! These are pure domain types with no infrastructure dependencies. The CLI
//! fills them from flags, environment, and an optional TOML file.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default backend base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Default timeout for request/response calls (init, interrupt).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for establishing a streaming connection.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Engine settings.
///
/// All fields are optional to support partial config files and graceful
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSettings {
    /// Base URL of the session API (no trailing slash required).
    pub api_base_url: Option<String>,

    /// Bearer token sent with every request.
    pub auth_token: Option<String>,

    /// Timeout for request/response calls. Streams have no read timeout.
    pub request_timeout_secs: Option<u64>,

    /// Timeout for establishing any connection, streams included.
    pub connect_timeout_secs: Option<u64>,

    /// Whether to request synthesized speech alongside text.
    pub voice_enabled: Option<bool>,
}

impl EngineSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
            auth_token: None,
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            voice_enabled: Some(false),
        }
    }

    /// Base URL with any trailing slash removed.
    #[must_use]
    pub fn effective_api_base_url(&self) -> String {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    #[must_use]
    pub const fn effective_request_timeout_secs(&self) -> u64 {
        match self.request_timeout_secs {
            Some(secs) => secs,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub const fn effective_connect_timeout_secs(&self) -> u64 {
        match self.connect_timeout_secs {
            Some(secs) => secs,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub const fn effective_voice_enabled(&self) -> bool {
        matches!(self.voice_enabled, Some(true))
    }

    /// Overlay every `Some` field of `other` onto `self`.
    pub fn overlay(&mut self, other: &Self) {
        if other.api_base_url.is_some() {
            self.api_base_url.clone_from(&other.api_base_url);
        }
        if other.auth_token.is_some() {
            self.auth_token.clone_from(&other.auth_token);
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.connect_timeout_secs.is_some() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
        if other.voice_enabled.is_some() {
            self.voice_enabled = other.voice_enabled;
        }
    }
}

/// Settings validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("API base URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),

    #[error("{field} must be between 1 and {max} seconds, got {value}")]
    InvalidTimeout {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Auth token must not be empty")]
    EmptyAuthToken,
}

/// Validate settings values.
pub fn validate_settings(settings: &EngineSettings) -> Result<(), SettingsError> {
    if let Some(ref url) = settings.api_base_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(SettingsError::InvalidBaseUrl(url.clone()));
    }

    for (field, value, max) in [
        ("request_timeout_secs", settings.request_timeout_secs, 600),
        ("connect_timeout_secs", settings.connect_timeout_secs, 120),
    ] {
        if let Some(value) = value
            && !(1..=max).contains(&value)
        {
            return Err(SettingsError::InvalidTimeout { field, value, max });
        }
    }

    if settings
        .auth_token
        .as_deref()
        .is_some_and(|token| token.trim().is_empty())
    {
        return Err(SettingsError::EmptyAuthToken);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(validate_settings(&EngineSettings::with_defaults()), Ok(()));
        assert_eq!(validate_settings(&EngineSettings::default()), Ok(()));
    }

    #[test]
    fn effective_values_fall_back_to_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.effective_api_base_url(), DEFAULT_API_BASE_URL);
        assert_eq!(
            settings.effective_request_timeout_secs(),
            DEFAULT_REQUEST_TIMEOUT_SECS
        );
        assert!(!settings.effective_voice_enabled());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let settings = EngineSettings {
            api_base_url: Some("https://cards.example/api/".into()),
            ..EngineSettings::default()
        };
        assert_eq!(settings.effective_api_base_url(), "https://cards.example/api");
    }

    #[test]
    fn rejects_bad_values() {
        let bad_url = EngineSettings {
            api_base_url: Some("ftp://x".into()),
            ..EngineSettings::default()
        };
        assert!(matches!(
            validate_settings(&bad_url),
            Err(SettingsError::InvalidBaseUrl(_))
        ));

        let bad_timeout = EngineSettings {
            request_timeout_secs: Some(0),
            ..EngineSettings::default()
        };
        assert!(matches!(
            validate_settings(&bad_timeout),
            Err(SettingsError::InvalidTimeout { field: "request_timeout_secs", .. })
        ));

        let empty_token = EngineSettings {
            auth_token: Some("  ".into()),
            ..EngineSettings::default()
        };
        assert_eq!(
            validate_settings(&empty_token),
            Err(SettingsError::EmptyAuthToken)
        );
    }

    #[test]
    fn overlay_only_touches_present_fields() {
        let mut base = EngineSettings::with_defaults();
        base.overlay(&EngineSettings {
            voice_enabled: Some(true),
            ..EngineSettings::default()
        });
        assert!(base.effective_voice_enabled());
        assert_eq!(base.api_base_url.as_deref(), Some(DEFAULT_API_BASE_URL));
    }

    #[test]
    fn partial_toml_style_json_deserializes() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"voice_enabled": true}"#).unwrap();
        assert_eq!(settings.voice_enabled, Some(true));
        assert_eq!(settings.api_base_url, None);
    }
}
