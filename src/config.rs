//! Runtime configuration.
//!
//! Loaded from a TOML file when one exists; every field has a default so an
//! empty or missing file yields a working setup.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rand::distr::Alphanumeric;
use rand::{rng, Rng};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::token::{TokenService, DEFAULT_TOKEN_TTL_DAYS};

const SECRET_FILE: &str = "jwt-secret";
const GENERATED_SECRET_LEN: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Signing secret. Overridden by `JWT_SECRET`; generated when absent.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

fn default_token_ttl_days() -> i64 {
    DEFAULT_TOKEN_TTL_DAYS
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    /// Resolve the signing secret: `JWT_SECRET` env var, then the config
    /// value, then `<data_dir>/jwt-secret`, otherwise a fresh secret that is
    /// written to that file.
    pub fn resolve_jwt_secret(&self) -> Result<String> {
        self.resolve_jwt_secret_with(std::env::var("JWT_SECRET").ok())
    }

    fn resolve_jwt_secret_with(&self, from_env: Option<String>) -> Result<String> {
        let configured = from_env
            .into_iter()
            .chain(self.auth.jwt_secret.clone())
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty());
        if let Some(secret) = configured {
            return Ok(secret);
        }

        let secret_path = self.storage.data_dir.join(SECRET_FILE);
        if let Ok(existing) = std::fs::read_to_string(&secret_path) {
            let trimmed = existing.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        let secret: String = rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_SECRET_LEN)
            .map(char::from)
            .collect();
        std::fs::create_dir_all(&self.storage.data_dir).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                self.storage.data_dir.display()
            )
        })?;
        std::fs::write(&secret_path, &secret)
            .with_context(|| format!("Failed to persist secret: {}", secret_path.display()))?;
        info!(path = %secret_path.display(), "generated new token secret");
        Ok(secret)
    }

    /// Token lifetime, checked so that tokens issued now still get an expiry.
    pub fn token_ttl(&self) -> Result<Duration> {
        let days = self.auth.token_ttl_days;
        if days <= 0 {
            anyhow::bail!("auth.token_ttl_days must be positive");
        }
        let ttl = Duration::try_days(days)
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
            .with_context(|| format!("auth.token_ttl_days out of range: {days}"))?;
        Ok(ttl)
    }

    pub fn token_service(&self) -> Result<TokenService> {
        let ttl = self.token_ttl()?;
        Ok(TokenService::with_ttl(self.resolve_jwt_secret()?, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.auth.token_ttl_days, 7);
        assert_eq!(config.logging.level, "info");
        assert!(config.auth.jwt_secret.is_none());
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clinic.toml");
        std::fs::write(
            &path,
            "[auth]\njwt_secret = \"from-file\"\n\n[storage]\ndata_dir = \"/var/lib/clinic\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-file"));
        assert_eq!(config.auth.token_ttl_days, 7);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/clinic"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[auth\ntoken_ttl_days = ").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn token_ttl_must_fit_the_calendar() {
        let mut config = Config::default();
        assert_eq!(config.token_ttl().unwrap(), Duration::days(7));

        config.auth.token_ttl_days = 0;
        assert!(config.token_ttl().is_err());

        config.auth.token_ttl_days = 1_000_000_000;
        assert!(config.token_ttl().is_err());

        config.auth.token_ttl_days = i64::MAX;
        assert!(config.token_ttl().is_err());
    }

    #[test]
    fn env_secret_wins_over_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.auth.jwt_secret = Some("configured".to_string());

        let secret = config
            .resolve_jwt_secret_with(Some("from-env".to_string()))
            .unwrap();
        assert_eq!(secret, "from-env");

        let secret = config.resolve_jwt_secret_with(Some("  ".to_string())).unwrap();
        assert_eq!(secret, "configured");
    }

    #[test]
    fn generated_secret_is_persisted_and_reused() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let first = config.resolve_jwt_secret_with(None).unwrap();
        assert_eq!(first.len(), GENERATED_SECRET_LEN);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));

        let on_disk = std::fs::read_to_string(config.storage.data_dir.join(SECRET_FILE)).unwrap();
        assert_eq!(on_disk, first);
        assert_eq!(config.resolve_jwt_secret_with(None).unwrap(), first);
    }
}
