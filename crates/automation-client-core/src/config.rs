use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::auth::{AuthInputError, normalize_host};

pub const ENV_CONFIG_PATH: &str = "AUTOMATION_DASHBOARD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "conf.yaml";
const DEFAULT_API_PATH: &str = "/api";
const DEFAULT_AUTH_PATH: &str = "/auth";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_REQUEST_ATTEMPTS: usize = 2;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config document is not valid yaml: {0}")]
    Parse(String),
    #[error("invalid `{key}`: {source}")]
    InvalidHost {
        key: &'static str,
        #[source]
        source: AuthInputError,
    },
    #[error("invalid `{key}`: path must not contain a scheme or host")]
    InvalidPath { key: &'static str },
}

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    frontend: RawFrontendConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawFrontendConfig {
    api_path: Option<String>,
    auth_path: Option<String>,
    user_api_host: String,
    meal_api_host: String,
    finance_api_host: String,
    backup_api_host: String,
    request_timeout_ms: Option<u64>,
    request_attempts: Option<usize>,
    #[serde(default)]
    accept_invalid_certs: bool,
    log_filter: Option<String>,
}

/// Dashboard settings from the `frontend` section of the config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendConfig {
    pub api_path: String,
    pub auth_path: String,
    pub user_api_host: String,
    pub meal_api_host: String,
    pub finance_api_host: String,
    pub backup_api_host: String,
    pub request_timeout_ms: u64,
    pub request_attempts: usize,
    /// Self-hosted deployments often sit behind self-signed certificates.
    pub accept_invalid_certs: bool,
    pub log_filter: String,
}

/// Base URL of every backend service the dashboard talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub auth: String,
    pub users: String,
    pub meal: String,
    pub finance: String,
    pub backups: String,
}

impl FrontendConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument =
            serde_yaml::from_str(raw).map_err(|error| ConfigError::Parse(error.to_string()))?;
        Self::from_raw(document.frontend)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Loads the file named by `AUTOMATION_DASHBOARD_CONFIG`, or `conf.yaml`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(ENV_CONFIG_PATH)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::from_path(path)
    }

    fn from_raw(raw: RawFrontendConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            api_path: normalize_path(
                "api-path",
                raw.api_path.as_deref().unwrap_or(DEFAULT_API_PATH),
            )?,
            auth_path: normalize_path(
                "auth-path",
                raw.auth_path.as_deref().unwrap_or(DEFAULT_AUTH_PATH),
            )?,
            user_api_host: host("user-api-host", &raw.user_api_host)?,
            meal_api_host: host("meal-api-host", &raw.meal_api_host)?,
            finance_api_host: host("finance-api-host", &raw.finance_api_host)?,
            backup_api_host: host("backup-api-host", &raw.backup_api_host)?,
            request_timeout_ms: raw.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            request_attempts: raw.request_attempts.unwrap_or(DEFAULT_REQUEST_ATTEMPTS),
            accept_invalid_certs: raw.accept_invalid_certs,
            log_filter: raw
                .log_filter
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> ServiceEndpoints {
        ServiceEndpoints {
            auth: format!("{}{}", self.user_api_host, self.auth_path),
            users: format!("{}{}", self.user_api_host, self.api_path),
            meal: format!("{}{}", self.meal_api_host, self.api_path),
            finance: format!("{}{}", self.finance_api_host, self.api_path),
            backups: format!("{}{}", self.backup_api_host, self.api_path),
        }
    }
}

fn host(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    normalize_host(raw).map_err(|source| ConfigError::InvalidHost { key, source })
}

fn normalize_path(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.contains("://") {
        return Err(ConfigError::InvalidPath { key });
    }
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("/{trimmed}"))
}
