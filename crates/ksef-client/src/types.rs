//! Common types for the client SDK

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ksef_crypto::{EncryptionInfo, SymmetricKeyMaterial};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rate_limit::SessionPermit;

/// Declared purpose of a platform public key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyUsage {
    /// Encrypts authentication tokens
    KsefTokenEncryption,
    /// Wraps session AES keys
    SymmetricKeyEncryption,
    /// Any usage this client does not know about
    #[serde(other)]
    Other,
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KsefTokenEncryption => "KsefTokenEncryption",
            Self::SymmetricKeyEncryption => "SymmetricKeyEncryption",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

/// One entry of the public key certificate listing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCertificateInfo {
    /// Base64 DER certificate
    pub certificate: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Usages this certificate may be used for
    pub usage: Vec<KeyUsage>,
}

impl PublicKeyCertificateInfo {
    /// Check if this certificate advertises `usage`
    pub fn supports(&self, usage: KeyUsage) -> bool {
        usage != KeyUsage::Other && self.usage.contains(&usage)
    }
}

/// A certificate held by the public key cache
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCertificate {
    pub usage: KeyUsage,
    /// `-----BEGIN CERTIFICATE-----` PEM
    pub pem: String,
    pub valid_to: DateTime<Utc>,
}

impl PublicKeyCertificate {
    /// Check if the certificate may still be used at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_to
    }
}

/// A request handed to the transport
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured endpoint, starting with `/`
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    /// Create a request without body
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    pub fn with_json<T: Serialize>(mut self, body: &T) -> crate::Result<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        self.headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    /// Attach a raw body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response returned by the transport
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    /// Deserialize the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// An admitted session: its concurrency slot and its key material
///
/// Dropping the value releases the slot.
#[derive(Debug)]
pub struct OpenedSession {
    pub permit: SessionPermit,
    pub material: SymmetricKeyMaterial,
}

impl OpenedSession {
    /// Fields for the session-open request body
    pub fn encryption_info(&self) -> EncryptionInfo {
        self.material.encryption_info()
    }
}
