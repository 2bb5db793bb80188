use serde::{Deserialize, Serialize};

use crate::types::User;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthInputError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("host must use http:// or https:// and include a host name")]
    InvalidHost,
    #[error("email must not be empty")]
    EmptyEmail,
    #[error("password must not be empty")]
    EmptyPassword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: &str, password: &str) -> Result<Self, AuthInputError> {
        Ok(Self {
            email: normalize_email(email)?,
            password: normalize_password(password)?,
        })
    }
}

/// The `{user, token}` record kept in client storage between reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub user: User,
    pub token: String,
}

impl PersistedSession {
    /// A record missing its user id or token is as good as no record.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.user.id.trim().is_empty() && !self.token.trim().is_empty()
    }
}

pub fn normalize_host(raw: &str) -> Result<String, AuthInputError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthInputError::EmptyHost);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthInputError::InvalidHost);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(AuthInputError::InvalidHost);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(AuthInputError::InvalidHost);
    }
    Ok(trimmed.to_string())
}

pub fn normalize_email(raw: &str) -> Result<String, AuthInputError> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(AuthInputError::EmptyEmail);
    }
    Ok(normalized)
}

// Passwords are sent exactly as typed.
pub fn normalize_password(raw: &str) -> Result<String, AuthInputError> {
    if raw.is_empty() {
        return Err(AuthInputError::EmptyPassword);
    }
    Ok(raw.to_string())
}
