//! Configuration loading and resolution
//!
//! Every setting resolves through the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`OMIVAL_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// HTTP listen address, e.g. "127.0.0.1:8000"
    pub bind_addr: String,
    /// Google Geocoding API key; the Google fallback is disabled when unset
    pub google_geocoding_api_key: Option<String>,
    /// Timeout applied to every outbound geocoding request
    pub geocode_timeout_secs: u64,
    /// Origins allowed by the CORS layer
    pub cors_origins: Vec<String>,
}

/// Command-line overrides collected by the binary
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub bind: Option<String>,
}

/// Values captured from the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub config_file: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub bind: Option<String>,
    pub google_geocoding_api_key: Option<String>,
}

impl EnvOverrides {
    pub fn capture() -> Self {
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            config_file: get("OMIVAL_CONFIG").map(PathBuf::from),
            database: get("OMIVAL_DATABASE").map(PathBuf::from),
            bind: get("OMIVAL_BIND"),
            google_geocoding_api_key: get("OMIVAL_GOOGLE_API_KEY"),
        }
    }
}

/// On-disk TOML configuration (all fields optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub database_path: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub google_geocoding_api_key: Option<String>,
    pub geocode_timeout_secs: Option<u64>,
    pub cors_origins: Option<Vec<String>>,
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config file: {e}")))
    }
}

impl Settings {
    /// Resolve settings from CLI overrides, environment, and config file.
    pub fn load(cli: &Overrides) -> Result<Self> {
        let env = EnvOverrides::capture();
        let file = load_config_file(cli, &env)?;
        Ok(Self::merge(cli, &env, file))
    }

    /// Pure merge of the three override layers over compiled defaults.
    pub fn merge(cli: &Overrides, env: &EnvOverrides, file: Option<FileConfig>) -> Self {
        let file = file.unwrap_or_default();
        Settings {
            database_path: cli
                .database
                .clone()
                .or_else(|| env.database.clone())
                .or(file.database_path)
                .unwrap_or_else(default_database_path),
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| env.bind.clone())
                .or(file.bind_addr)
                .unwrap_or_else(|| "127.0.0.1:8000".to_string()),
            google_geocoding_api_key: env
                .google_geocoding_api_key
                .clone()
                .or(file.google_geocoding_api_key)
                .filter(|k| !k.is_empty()),
            geocode_timeout_secs: file.geocode_timeout_secs.unwrap_or(10),
            cors_origins: file
                .cors_origins
                .unwrap_or_else(|| vec!["http://localhost:5173".to_string()]),
        }
    }
}

/// Read the config file named by CLI or env, or the platform default if present.
fn load_config_file(cli: &Overrides, env: &EnvOverrides) -> Result<Option<FileConfig>> {
    let explicit = cli.config_file.clone().or_else(|| env.config_file.clone());
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            path
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(None),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    match FileConfig::parse(&content) {
        Ok(cfg) => Ok(Some(cfg)),
        Err(e) => {
            warn!("Ignoring unreadable config file {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Platform config file: ~/.config/omival/config.toml (or OS equivalent)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("omival").join("config.toml"))
}

/// Platform data dir: ~/.local/share/omival/omival.db (or OS equivalent)
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("omival").join("omival.db"))
        .unwrap_or_else(|| PathBuf::from("./omival.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_uses_defaults_when_empty() {
        let settings = Settings::merge(&Overrides::default(), &EnvOverrides::default(), None);
        assert_eq!(settings.bind_addr, "127.0.0.1:8000");
        assert_eq!(settings.geocode_timeout_secs, 10);
        assert!(settings.google_geocoding_api_key.is_none());
        assert_eq!(settings.cors_origins, vec!["http://localhost:5173"]);
    }

    #[test]
    fn merge_prefers_cli_over_env_over_file() {
        let cli = Overrides {
            config_file: None,
            database: Some(PathBuf::from("/cli/omival.db")),
            bind: None,
        };
        let env = EnvOverrides {
            database: Some(PathBuf::from("/env/omival.db")),
            bind: Some("0.0.0.0:9000".to_string()),
            ..Default::default()
        };
        let file = FileConfig {
            database_path: Some(PathBuf::from("/file/omival.db")),
            bind_addr: Some("127.0.0.1:7000".to_string()),
            ..Default::default()
        };

        let settings = Settings::merge(&cli, &env, Some(file));
        assert_eq!(settings.database_path, PathBuf::from("/cli/omival.db"));
        assert_eq!(settings.bind_addr, "0.0.0.0:9000");
    }

    #[test]
    fn parses_full_config_file() {
        let cfg = FileConfig::parse(
            r#"
            database_path = "/srv/omival/omival.db"
            bind_addr = "0.0.0.0:8000"
            google_geocoding_api_key = "abc123"
            geocode_timeout_secs = 5
            cors_origins = ["http://localhost:5173", "https://example.com"]
            "#,
        )
        .unwrap();

        let settings = Settings::merge(&Overrides::default(), &EnvOverrides::default(), Some(cfg));
        assert_eq!(settings.database_path, PathBuf::from("/srv/omival/omival.db"));
        assert_eq!(settings.geocode_timeout_secs, 5);
        assert_eq!(
            settings.google_geocoding_api_key.as_deref(),
            Some("abc123")
        );
        assert_eq!(settings.cors_origins.len(), 2);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(FileConfig::parse("bind_addr = [not toml").is_err());
    }

    #[test]
    fn blank_api_key_is_treated_as_unset() {
        let cfg = FileConfig {
            google_geocoding_api_key: Some(String::new()),
            ..Default::default()
        };
        let settings = Settings::merge(&Overrides::default(), &EnvOverrides::default(), Some(cfg));
        assert!(settings.google_geocoding_api_key.is_none());
    }
}
