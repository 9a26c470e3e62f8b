//! Session key negotiation

use crate::public_keys::PublicKeyProvider;
use crate::types::KeyUsage;
use crate::Result;
use ksef_crypto::{load_rsa_public_key, SymmetricKeyMaterial};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Generates fresh per-session AES key material
///
/// Nothing is cached: every call draws a new key and IV and wraps the key
/// under the platform certificate current for the requested usage.
#[derive(Debug, Clone)]
pub struct SymmetricKeyManager {
    provider: Arc<PublicKeyProvider>,
}

impl SymmetricKeyManager {
    pub fn new(provider: Arc<PublicKeyProvider>) -> Self {
        Self { provider }
    }

    /// Material wrapped for [`KeyUsage::SymmetricKeyEncryption`]
    pub async fn create_session_material(&self) -> Result<SymmetricKeyMaterial> {
        self.create_material(KeyUsage::SymmetricKeyEncryption).await
    }

    /// Material wrapped under the certificate for `usage`
    #[instrument(skip(self))]
    pub async fn create_material(&self, usage: KeyUsage) -> Result<SymmetricKeyMaterial> {
        let pem = self.provider.get_public_key(usage).await?;
        let recipient = load_rsa_public_key(&pem)?;
        let material = SymmetricKeyMaterial::generate(&recipient)?;
        debug!(%usage, "generated session key material");
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::public_keys::test_support::{info, StaticSource};
    use crate::ClientError;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chrono::{Duration, Utc};
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::{Oaep, RsaPrivateKey};

    const RSA_PKCS8: &str = include_str!("../../ksef-crypto/tests/data/rsa_pkcs8.pem");

    fn manager(usage: Vec<KeyUsage>) -> (SymmetricKeyManager, Arc<StaticSource>) {
        let source = StaticSource::new(vec![info(usage, Utc::now() + Duration::days(30))]);
        let provider = Arc::new(PublicKeyProvider::new(source.clone()));
        (SymmetricKeyManager::new(provider), source)
    }

    #[tokio::test]
    async fn test_material_unwraps_to_key() {
        let (manager, _) = manager(vec![KeyUsage::SymmetricKeyEncryption]);
        let material = manager.create_session_material().await.unwrap();
        assert_eq!(material.key().len(), 32);
        assert_eq!(material.iv().len(), 16);

        let private = RsaPrivateKey::from_pkcs8_pem(RSA_PKCS8).unwrap();
        let wrapped = STANDARD.decode(material.wrapped_key_base64()).unwrap();
        let unwrapped = private.decrypt(Oaep::new::<sha2::Sha256>(), &wrapped).unwrap();
        assert_eq!(unwrapped.as_slice(), material.key());
        assert_eq!(STANDARD.decode(material.iv_base64()).unwrap(), material.iv());
    }

    #[tokio::test]
    async fn test_fresh_material_per_call_cached_key() {
        let (manager, source) = manager(vec![KeyUsage::SymmetricKeyEncryption]);
        let a = manager.create_session_material().await.unwrap();
        let b = manager.create_session_material().await.unwrap();
        assert_ne!(a.key(), b.key());
        assert_ne!(a.iv(), b.iv());
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_missing_usage() {
        let (manager, _) = manager(vec![KeyUsage::KsefTokenEncryption]);
        let err = manager.create_session_material().await.unwrap_err();
        assert!(matches!(err, ClientError::KeyNotFound(KeyUsage::SymmetricKeyEncryption)));
    }
}
