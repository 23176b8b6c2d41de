use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::rate_limit::RateLimitConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set")]
    MissingSecret,
    #[error("JWT_SECRET must be at least {0} characters long")]
    ShortSecret(usize),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub const MIN_SECRET_LEN: usize = 32;

/// Process-wide settings, read once at startup and shared through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub database_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub proposal_ttl_hours: i64,
    pub admin_registration_key: Option<String>,
    pub frontend_url: String,
    pub enable_hsts: bool,
    pub rate_limits: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 1011,
            jwt_secret: String::new(),
            jwt_ttl_hours: 24,
            database_url: None,
            data_dir: None,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 10 * 1024 * 1024,
            proposal_ttl_hours: 24,
            admin_registration_key: None,
            frontend_url: "http://localhost:3000".into(),
            enable_hsts: false,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT", defaults.port),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            jwt_ttl_hours: parsed("JWT_TTL_HOURS", defaults.jwt_ttl_hours),
            database_url: non_empty("DATABASE_URL"),
            data_dir: non_empty("URBIFIX_DATA_DIR").map(PathBuf::from),
            upload_dir: non_empty("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            proposal_ttl_hours: parsed("PROPOSAL_TTL_HOURS", defaults.proposal_ttl_hours),
            admin_registration_key: non_empty("ADMIN_REGISTRATION_KEY"),
            frontend_url: non_empty("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            enable_hsts: env::var("ENABLE_HSTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            rate_limits: RateLimitConfig::from_env(),
        }
    }

    /// Convenience for tests: a valid config with the given secret and no persistence.
    pub fn for_secret(secret: &str) -> Self {
        Self { jwt_secret: secret.to_string(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::ShortSecret(MIN_SECRET_LEN));
        }
        if self.jwt_ttl_hours <= 0 {
            return Err(ConfigError::Zero("JWT_TTL_HOURS"));
        }
        if self.proposal_ttl_hours <= 0 {
            return Err(ConfigError::Zero("PROPOSAL_TTL_HOURS"));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Zero("MAX_UPLOAD_BYTES"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_and_short_secrets() {
        assert_eq!(AppConfig::default().validate(), Err(ConfigError::MissingSecret));
        assert_eq!(
            AppConfig::for_secret("short").validate(),
            Err(ConfigError::ShortSecret(MIN_SECRET_LEN))
        );
        assert!(AppConfig::for_secret("0123456789abcdef0123456789abcdef").validate().is_ok());
    }

    #[test]
    fn rejects_zero_windows() {
        let mut cfg = AppConfig::for_secret("0123456789abcdef0123456789abcdef");
        cfg.proposal_ttl_hours = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("PROPOSAL_TTL_HOURS")));
    }
}
