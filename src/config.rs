use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::embed::MAX_TTL_DAYS;
use crate::integrations::crm::DEFAULT_BASE_URL;
use crate::integrations::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid public_url {0}")]
    PublicUrl(String),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crm_base_url: String,
    pub request_timeout_secs: u64,
    /// Token used when a form request does not carry one.
    pub default_token: String,
    pub default_company_id: String,
    pub recaptcha_secret: String,
    pub recaptcha_site_key: String,
    /// Bearer key for the embed management API; blank closes it.
    pub admin_key: String,
    pub bind_address: String,
    /// Externally visible base URL, used to build embed links.
    pub public_url: String,
    pub database_path: PathBuf,
    pub embed_ttl_days: u32,
    pub retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crm_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,
            default_token: String::new(),
            default_company_id: String::new(),
            recaptcha_secret: String::new(),
            recaptcha_site_key: String::new(),
            admin_key: String::new(),
            bind_address: "127.0.0.1:8080".to_string(),
            public_url: "http://127.0.0.1:8080".to_string(),
            database_path: data_dir().join("weblead.db"),
            embed_ttl_days: 30,
            retry: RetryPolicy::default(),
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("crm_base_url", &self.crm_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("default_token_set", &!self.default_token.is_empty())
            .field("default_company_id", &self.default_company_id)
            .field("recaptcha_enabled", &!self.recaptcha_secret.is_empty())
            .field("admin_key_set", &!self.admin_key.is_empty())
            .field("bind_address", &self.bind_address)
            .field("public_url", &self.public_url)
            .field("database_path", &self.database_path)
            .field("embed_ttl_days", &self.embed_ttl_days)
            .field("retry", &self.retry)
            .finish()
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weblead")
}

/// `WEBLEAD_CONFIG`, or `<config dir>/weblead/config.json`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("WEBLEAD_CONFIG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weblead")
        .join("config.json")
}

impl AppConfig {
    /// Load from `path`, writing defaults there when the file does not exist,
    /// then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            let c = Self::default();
            c.save(path);
            c
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    log::warn!("could not write default config to {}: {}", path.display(), e);
                }
            }
            Err(e) => log::warn!("could not serialize config: {}", e),
        }
    }

    /// Environment variables win over the file. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("WEBLEAD_CRM_BASE_URL") {
            self.crm_base_url = v;
        }
        if let Some(v) = get("WEBLEAD_DEFAULT_TOKEN") {
            self.default_token = v;
        }
        if let Some(v) = get("WEBLEAD_DEFAULT_COMPANY_ID") {
            self.default_company_id = v;
        }
        if let Some(v) = get("RECAPTCHA_SECRET_KEY") {
            self.recaptcha_secret = v;
        }
        if let Some(v) = get("RECAPTCHA_SITE_KEY") {
            self.recaptcha_site_key = v;
        }
        if let Some(v) = get("WEBLEAD_ADMIN_KEY") {
            self.admin_key = v;
        }
        if let Some(v) = get("WEBLEAD_BIND") {
            self.bind_address = v;
        }
        if let Some(v) = get("WEBLEAD_PUBLIC_URL") {
            self.public_url = v;
        }
        if let Some(v) = get("WEBLEAD_DB_PATH") {
            self.database_path = PathBuf::from(v);
        }
        match get("WEBLEAD_REQUEST_TIMEOUT_SECS").map(|v| v.parse::<u64>()) {
            Some(Ok(secs)) if secs > 0 => self.request_timeout_secs = secs,
            Some(_) => log::warn!("ignoring invalid WEBLEAD_REQUEST_TIMEOUT_SECS"),
            None => {}
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Capped at [`MAX_TTL_DAYS`].
    pub fn embed_ttl(&self) -> Option<chrono::Duration> {
        let days = self.embed_ttl_days.min(MAX_TTL_DAYS);
        (days > 0).then(|| chrono::Duration::days(i64::from(days)))
    }

    pub fn public_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.public_url)
            .map_err(|e| ConfigError::PublicUrl(format!("{}: {}", self.public_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::PublicUrl(self.public_url.clone()));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weblead").join("config.json");

        let config = AppConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.embed_ttl_days, 30);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"crm_base_url": "https://crm.test/api", "retry": {"max_retries": 2}}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.crm_base_url, "https://crm.test/api");
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
        assert_eq!(config.bind_address, "127.0.0.1:8080");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("WEBLEAD_DEFAULT_TOKEN", "env-token"),
            ("RECAPTCHA_SECRET_KEY", "shh"),
            ("WEBLEAD_BIND", ""),
            ("WEBLEAD_ADMIN_KEY", "admin-789"),
            ("WEBLEAD_REQUEST_TIMEOUT_SECS", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.default_token, "env-token");
        assert_eq!(config.recaptcha_secret, "shh");
        assert_eq!(config.admin_key, "admin-789");
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = AppConfig {
            default_token: "tok-123".into(),
            recaptcha_secret: "shh-456".into(),
            admin_key: "admin-789".into(),
            ..AppConfig::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("admin-789"));
        assert!(!printed.contains("tok-123"));
        assert!(!printed.contains("shh-456"));
    }

    #[test]
    fn embed_ttl_zero_means_no_expiry() {
        let config = AppConfig {
            embed_ttl_days: 0,
            ..AppConfig::default()
        };
        assert!(config.embed_ttl().is_none());
        assert_eq!(
            AppConfig::default().embed_ttl(),
            Some(chrono::Duration::days(30))
        );
    }
}
