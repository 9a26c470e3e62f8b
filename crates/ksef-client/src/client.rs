//! Main client implementation

use crate::public_keys::{CertificateSource, HttpCertificateSource, PublicKeyProvider};
use crate::rate_limit::RateLimiter;
use crate::session::SymmetricKeyManager;
use crate::transport::HttpTransport;
use crate::types::{ApiRequest, ApiResponse, KeyUsage, OpenedSession};
use crate::{Config, Result};
use chrono::NaiveDate;
use ksef_crypto::{
    certificate_verification_url, encrypt_token, invoice_verification_url, split_encrypted,
    ChallengeTimestamp, ChunkedBatch, ContextIdentifierType, OfflineCertificate,
    SymmetricKeyMaterial,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// KSeF client
///
/// Owns one transport, one public key cache and one rate limiter. Nothing
/// is shared between client instances. The limiter sits inside the
/// transport, so certificate listings and retries are admitted through it
/// as well.
pub struct KsefClient {
    config: Config,
    transport: Arc<HttpTransport>,
    public_keys: Arc<PublicKeyProvider>,
    session_keys: SymmetricKeyManager,
    limiter: Arc<RateLimiter>,
}

impl KsefClient {
    /// Create a new client with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let transport =
            Arc::new(HttpTransport::new(&config)?.with_rate_limiter(Arc::clone(&limiter)));
        let source = Arc::new(HttpCertificateSource::new(Arc::clone(&transport)));
        Ok(Self::build(config, transport, source, limiter))
    }

    /// Create a client whose certificates come from `source`
    pub fn with_certificate_source(
        config: Config,
        source: Arc<dyn CertificateSource>,
    ) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let transport =
            Arc::new(HttpTransport::new(&config)?.with_rate_limiter(Arc::clone(&limiter)));
        Ok(Self::build(config, transport, source, limiter))
    }

    fn build(
        config: Config,
        transport: Arc<HttpTransport>,
        source: Arc<dyn CertificateSource>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let public_keys = Arc::new(
            PublicKeyProvider::new(source).with_refresh_margin(config.public_key_refresh_margin),
        );
        let session_keys = SymmetricKeyManager::new(Arc::clone(&public_keys));
        Self {
            config,
            transport,
            public_keys,
            session_keys,
            limiter,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn public_keys(&self) -> &PublicKeyProvider {
        &self.public_keys
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    // ==================== Keys ====================

    /// Platform certificate PEM for `usage`
    pub async fn public_key(&self, usage: KeyUsage) -> Result<String> {
        self.public_keys.get_public_key(usage).await
    }

    /// Fresh session key material
    pub async fn create_session_material(&self) -> Result<SymmetricKeyMaterial> {
        self.session_keys.create_session_material().await
    }

    /// Encrypt an authentication token for the given challenge
    ///
    /// The timestamp is validated before any certificate is fetched.
    #[instrument(skip(self, token, challenge_timestamp))]
    pub async fn encrypt_ksef_token(
        &self,
        token: &str,
        challenge_timestamp: impl Into<ChallengeTimestamp>,
    ) -> Result<String> {
        let timestamp = challenge_timestamp.into();
        timestamp.to_epoch_millis()?;
        let pem = self.public_keys.get_public_key(KeyUsage::KsefTokenEncryption).await?;
        Ok(encrypt_token(token, timestamp, &pem)?)
    }

    // ==================== Sessions ====================

    /// Claim a session slot and generate the session's key material
    ///
    /// The slot is returned if key generation fails.
    #[instrument(skip(self))]
    pub async fn open_session(&self) -> Result<OpenedSession> {
        let permit = self.limiter.acquire_session_permit()?;
        let material = self.session_keys.create_session_material().await?;
        debug!(active = self.limiter.active_sessions(), "session opened");
        Ok(OpenedSession { permit, material })
    }

    /// Split and encrypt a batch archive using the configured part size
    pub fn prepare_batch(
        &self,
        archive: &[u8],
        material: &SymmetricKeyMaterial,
    ) -> Result<ChunkedBatch> {
        Ok(split_encrypted(archive, material, self.config.batch_part_size)?)
    }

    // ==================== Verification links ====================

    /// Code I link for an invoice accepted online
    pub fn invoice_verification_url(
        &self,
        seller_tax_id: &str,
        issue_date: NaiveDate,
        document: &[u8],
    ) -> String {
        invoice_verification_url(
            &self.config.verification_base_url,
            seller_tax_id,
            issue_date,
            document,
        )
    }

    /// Signed Code II link for a document issued offline
    pub fn certificate_verification_url(
        &self,
        context_type: ContextIdentifierType,
        context_value: &str,
        seller_tax_id: &str,
        document: &[u8],
        certificate: Option<&OfflineCertificate>,
    ) -> Result<String> {
        Ok(certificate_verification_url(
            &self.config.verification_base_url,
            context_type,
            context_value,
            seller_tax_id,
            document,
            certificate,
        )?)
    }

    // ==================== Requests ====================

    /// Send `request`, failing with `RateLimitExceeded` if the limiter is
    /// saturated
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.transport.try_request(request).await
    }

    /// Like [`send`](Self::send) but waits for rate limit capacity
    pub async fn send_when_ready(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.transport.request(request).await
    }
}

impl std::fmt::Debug for KsefClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KsefClient")
            .field("endpoint", &self.config.endpoint)
            .field("public_keys", &self.public_keys)
            .field("limiter", &self.limiter)
            .finish()
    }
}
