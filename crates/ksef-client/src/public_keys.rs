//! Platform public key cache
//!
//! The platform publishes the certificates used to encrypt authentication
//! tokens and to wrap session keys. [`PublicKeyProvider`] keeps the current
//! certificate per usage and refetches the listing once it expires.
//!
//! Two callers missing the cache at the same moment both fetch; the later
//! write wins. The extra request is harmless, so there is no in-flight
//! de-duplication.

use crate::transport::HttpTransport;
use crate::types::{KeyUsage, PublicKeyCertificate, PublicKeyCertificateInfo};
use crate::{ClientError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ksef_crypto::certificate_to_pem;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Path of the public key certificate listing
pub const PUBLIC_KEY_CERTIFICATES_PATH: &str = "/security/public-key-certificates";

/// Source of the platform's certificate listing
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Fetch every published certificate
    async fn list_certificates(&self) -> Result<Vec<PublicKeyCertificateInfo>>;
}

/// Certificate listing fetched over HTTP
#[derive(Debug, Clone)]
pub struct HttpCertificateSource {
    transport: Arc<HttpTransport>,
}

impl HttpCertificateSource {
    pub fn new(transport: Arc<HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl CertificateSource for HttpCertificateSource {
    async fn list_certificates(&self) -> Result<Vec<PublicKeyCertificateInfo>> {
        self.transport.get_json(PUBLIC_KEY_CERTIFICATES_PATH).await
    }
}

/// Time-bound cache of platform public keys, keyed by usage
pub struct PublicKeyProvider {
    source: Arc<dyn CertificateSource>,
    cache: RwLock<HashMap<KeyUsage, PublicKeyCertificate>>,
    refresh_margin: chrono::Duration,
}

impl PublicKeyProvider {
    /// Create a provider over `source`
    pub fn new(source: Arc<dyn CertificateSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
            refresh_margin: chrono::Duration::zero(),
        }
    }

    /// Treat cached certificates as expired `margin` before their `validTo`
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        self
    }

    /// PEM certificate for `usage`
    pub async fn get_public_key(&self, usage: KeyUsage) -> Result<String> {
        self.get_certificate(usage).await.map(|cert| cert.pem)
    }

    /// Cached or freshly fetched certificate for `usage`
    pub async fn get_certificate(&self, usage: KeyUsage) -> Result<PublicKeyCertificate> {
        self.get_certificate_at(usage, Utc::now()).await
    }

    /// [`get_certificate`](Self::get_certificate) evaluated at `now`
    #[instrument(skip(self))]
    pub async fn get_certificate_at(
        &self,
        usage: KeyUsage,
        now: DateTime<Utc>,
    ) -> Result<PublicKeyCertificate> {
        if usage == KeyUsage::Other {
            return Err(ClientError::KeyNotFound(usage));
        }
        if let Some(cert) = self.cached(usage, now) {
            debug!(%usage, "public key cache hit");
            return Ok(cert);
        }

        info!(%usage, "fetching public key certificates");
        let listing = self.source.list_certificates().await?;
        let mut candidates: Vec<PublicKeyCertificateInfo> =
            listing.into_iter().filter(|info| info.supports(usage)).collect();
        if candidates.is_empty() {
            warn!(%usage, "no published certificate for usage");
            return Err(ClientError::KeyNotFound(usage));
        }

        // Latest expiry first
        candidates.sort_by(|a, b| b.valid_to.cmp(&a.valid_to));
        let best = &candidates[0];
        let cert = PublicKeyCertificate {
            usage,
            pem: certificate_to_pem(&best.certificate)?,
            valid_to: best.valid_to,
        };

        if cert.is_valid_at(now) {
            self.cache.write().insert(usage, cert.clone());
        } else {
            warn!(
                %usage,
                valid_to = %cert.valid_to,
                "published certificate already expired, not caching"
            );
        }
        Ok(cert)
    }

    fn cached(&self, usage: KeyUsage, now: DateTime<Utc>) -> Option<PublicKeyCertificate> {
        let cache = self.cache.read();
        let cert = cache.get(&usage)?;
        // A margin reaching past the representable range always refetches
        let deadline = now.checked_add_signed(self.refresh_margin)?;
        cert.is_valid_at(deadline).then(|| cert.clone())
    }

    /// Drop the cached certificate for `usage`
    pub fn invalidate(&self, usage: KeyUsage) {
        self.cache.write().remove(&usage);
    }

    /// Drop every cached certificate
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Number of cached certificates
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

impl std::fmt::Debug for PublicKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKeyProvider")
            .field("cached", &self.cached_len())
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub const RSA_CERT: &str = include_str!("../../ksef-crypto/tests/data/rsa_cert.pem");

    /// Base64 DER body of the RSA test certificate
    pub fn rsa_cert_base64() -> String {
        RSA_CERT
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect()
    }

    pub fn info(usage: Vec<KeyUsage>, valid_to: DateTime<Utc>) -> PublicKeyCertificateInfo {
        PublicKeyCertificateInfo {
            certificate: rsa_cert_base64(),
            valid_from: valid_to - chrono::Duration::days(365),
            valid_to,
            usage,
        }
    }

    /// In-memory listing that counts fetches
    #[derive(Default)]
    pub struct StaticSource {
        pub listing: Mutex<Vec<PublicKeyCertificateInfo>>,
        pub fetches: AtomicUsize,
    }

    impl StaticSource {
        pub fn new(listing: Vec<PublicKeyCertificateInfo>) -> Arc<Self> {
            Arc::new(Self {
                listing: Mutex::new(listing),
                fetches: AtomicUsize::new(0),
            })
        }

        pub fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CertificateSource for StaticSource {
        async fn list_certificates(&self) -> Result<Vec<PublicKeyCertificateInfo>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.listing.lock().clone())
        }
    }
}
