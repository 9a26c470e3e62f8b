//! Authentication token encryption
//!
//! Token-based authentication answers a server challenge with
//! `RSA-OAEP("{token}|{challengeTimestampMillis}")` under the platform's
//! `KsefTokenEncryption` certificate.

use crate::{keys::load_rsa_public_key, symmetric::rsa_oaep_encrypt, CryptoError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// A challenge timestamp as the server or caller supplied it
#[derive(Clone, Debug, PartialEq)]
pub enum ChallengeTimestamp {
    /// Epoch milliseconds as an integer
    EpochMillis(i64),
    /// Epoch milliseconds as a floating point number
    Millis(f64),
    /// Epoch milliseconds as a numeric string, or an ISO-8601 instant
    Text(String),
}

impl ChallengeTimestamp {
    /// Normalize to integer epoch milliseconds
    pub fn to_epoch_millis(&self) -> Result<i64> {
        match self {
            Self::EpochMillis(value) => Ok(*value),
            Self::Millis(value) => millis_from_number(*value),
            Self::Text(text) => millis_from_text(text),
        }
    }
}

impl From<i64> for ChallengeTimestamp {
    fn from(value: i64) -> Self {
        Self::EpochMillis(value)
    }
}

impl From<u64> for ChallengeTimestamp {
    fn from(value: u64) -> Self {
        // Beyond i64 the float path reports the value as out of range
        i64::try_from(value)
            .map(Self::EpochMillis)
            .unwrap_or(Self::Millis(value as f64))
    }
}

impl From<f64> for ChallengeTimestamp {
    fn from(value: f64) -> Self {
        Self::Millis(value)
    }
}

impl From<&str> for ChallengeTimestamp {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ChallengeTimestamp {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for ChallengeTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Text(value.to_rfc3339())
    }
}

fn millis_from_number(value: f64) -> Result<i64> {
    if !value.is_finite() {
        return Err(CryptoError::InvalidTimestamp(format!("{} is not a finite number", value)));
    }
    let truncated = value.trunc();
    // i64::MAX is not exactly representable; compare against the f64 boundary
    if truncated >= i64::MAX as f64 || truncated < i64::MIN as f64 {
        return Err(CryptoError::InvalidTimestamp(format!("{} is out of range", value)));
    }
    Ok(truncated as i64)
}

fn millis_from_text(text: &str) -> Result<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CryptoError::InvalidTimestamp("empty timestamp".to_string()));
    }
    if let Ok(millis) = text.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.timestamp_millis());
    }
    // Offset-less forms are interpreted as UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }
    Err(CryptoError::InvalidTimestamp(format!(
        "'{}' is neither epoch milliseconds nor an ISO-8601 date",
        text
    )))
}

/// The plaintext that gets encrypted: `"{token}|{epochMillis}"`
pub fn compose_token_payload(
    token: &str,
    challenge_timestamp: &ChallengeTimestamp,
) -> Result<String> {
    let millis = challenge_timestamp.to_epoch_millis()?;
    Ok(format!("{}|{}", token, millis))
}

/// Encrypt an authentication token bound to a challenge timestamp
///
/// `public_key_pem` is the platform's token-encryption certificate (or a
/// bare SPKI public key). The timestamp is validated before any key parsing.
pub fn encrypt_token(
    token: &str,
    challenge_timestamp: impl Into<ChallengeTimestamp>,
    public_key_pem: &str,
) -> Result<String> {
    let payload = compose_token_payload(token, &challenge_timestamp.into())?;
    let public_key = load_rsa_public_key(public_key_pem)?;
    let ciphertext = rsa_oaep_encrypt(&public_key, payload.as_bytes())?;
    Ok(STANDARD.encode(ciphertext))
}
