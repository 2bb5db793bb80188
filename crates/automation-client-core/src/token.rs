//! Reads the expiry embedded in a bearer token.
//!
//! Tokens are JWT-shaped (`header.payload.signature`). Only the payload's
//! `exp` claim is inspected; signatures are the backend's business.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a three part bearer token")]
    Malformed,
    #[error("token payload is not valid base64")]
    Encoding,
    #[error("token payload is not valid json: {0}")]
    Claims(String),
    #[error("token expiry is out of range")]
    ExpiryOutOfRange,
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

pub fn token_expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|_| TokenError::Encoding)?;
    let claims: ExpiryClaims =
        serde_json::from_slice(&bytes).map_err(|error| TokenError::Claims(error.to_string()))?;

    DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::ExpiryOutOfRange)
}

/// A token whose expiry cannot be read is treated as expired.
#[must_use]
pub fn is_token_live(token: &str, now: DateTime<Utc>) -> bool {
    token_expiry(token).is_ok_and(|expiry| expiry > now)
}

/// Renders a duration as "2 days 1 hour 5 seconds". Zero and negative
/// durations render as "0 seconds".
#[must_use]
pub fn humanize_remaining(remaining: TimeDelta) -> String {
    let total = remaining.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total / 3_600) % 24;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    for (value, unit) in [(days, "day"), (hours, "hour"), (minutes, "minute")] {
        if value > 0 {
            parts.push(plural(value, unit));
        }
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(plural(seconds, "second"));
    }
    parts.join(" ")
}

fn plural(value: i64, unit: &str) -> String {
    if value == 1 {
        format!("{value} {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u-1","exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}
