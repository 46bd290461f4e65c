//! Runtime settings, read from `habit-tracker.toml` when present.

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "habit-tracker.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding both JSON snapshots and the `logs/` folder.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// The only account allowed past the identity gate.
    #[serde(default)]
    pub allowed_email: Option<String>,

    /// Header carrying the verified email from the fronting identity proxy.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Base64 of 32 bytes. Random per process when unset.
    #[serde(default)]
    pub session_key: Option<String>,

    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: i64,

    #[serde(default)]
    pub log_to_file: bool,
}

fn default_data_dir() -> PathBuf { PathBuf::from(".") }
fn default_host() -> String { "localhost".to_string() }
fn default_port() -> u16 { 5001 }
fn default_identity_header() -> String { "x-forwarded-email".to_string() }
fn default_session_ttl_minutes() -> i64 { 60 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            host: default_host(),
            port: default_port(),
            allowed_email: None,
            identity_header: default_identity_header(),
            session_key: None,
            session_ttl_minutes: default_session_ttl_minutes(),
            log_to_file: false,
        }
    }
}

impl Settings {
    /// `None` for a missing file; a present but broken file is an error.
    /// Runs before tracing is installed, so the caller reports the outcome.
    pub fn from_file(path: &Path) -> AppResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(Some(settings))
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.session_ttl_minutes <= 0 {
            return Err(AppError::Config(
                "session_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.identity_header.trim().is_empty() {
            return Err(AppError::Config("identity_header cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = Settings::from_file(&dir.path().join(DEFAULT_CONFIG_FILE)).expect("no error");
        assert!(loaded.is_none());
        let settings = loaded.unwrap_or_default();
        assert_eq!(settings.port, 5001);
        assert_eq!(settings.host, "localhost");
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(
            &path,
            "data_dir = \"/var/lib/habits\"\nallowed_email = \"me@example.com\"\nport = 8081\n",
        )
        .expect("write config");

        let settings = Settings::from_file(&path).expect("settings").expect("present");
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/habits"));
        assert_eq!(settings.allowed_email.as_deref(), Some("me@example.com"));
        assert_eq!(settings.port, 8081);
        assert_eq!(settings.session_ttl_minutes, 60);
        assert_eq!(settings.identity_header, "x-forwarded-email");
    }

    #[test]
    fn broken_or_invalid_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        std::fs::write(&path, "port = \"not a number\"").expect("write config");
        assert!(matches!(Settings::from_file(&path), Err(AppError::Config(_))));

        std::fs::write(&path, "session_ttl_minutes = 0").expect("write config");
        assert!(matches!(Settings::from_file(&path), Err(AppError::Config(_))));
    }
}
