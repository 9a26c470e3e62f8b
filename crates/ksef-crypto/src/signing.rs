//! Verification-code signing
//!
//! Offline verification codes carry a signature over the link itself. The
//! signed message is the SHA-256 digest of the canonical link (scheme and
//! trailing slash removed), and the digest is signed as-is: no second hash.
//!
//! - RSA keys sign with RSA-PSS (SHA-256, MGF1-SHA-256, 32-byte salt).
//! - P-256 keys sign with ECDSA, emitting IEEE P1363 `r || s` by default.

use crate::{
    hashing::{base64url_decode, base64url_encode, sha256},
    keys::{parse_certificate, SigningKeyMaterial, PEM_CERTIFICATE},
    CryptoError, Result,
};
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{DerSignature, Signature as P256Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pss, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use x509_cert::der::Encode;

/// PSS salt length in bytes
pub const PSS_SALT_LEN: usize = 32;

/// Length of a P-256 signature in IEEE P1363 encoding
pub const P1363_SIGNATURE_LEN: usize = 64;

/// Signature algorithm used for a verification code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PSS with SHA-256
    RsaPss,
    /// ECDSA over NIST P-256 with SHA-256
    EcdsaP256,
}

/// Output encoding for ECDSA signatures
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EcdsaEncoding {
    /// Fixed 64-byte `r || s`
    #[default]
    IeeeP1363,
    /// ASN.1 DER `SEQUENCE { r, s }`
    Der,
}

/// A produced signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Algorithm that produced it
    pub algorithm: SignatureAlgorithm,
    /// Signature bytes, unpadded base64url
    pub value_base64url: String,
}

/// Strip the scheme and any trailing slash from a verification link
pub fn canonicalize_path(url: &str) -> &str {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    without_scheme.trim_end_matches('/')
}

/// Signs canonical verification paths with one private key
#[derive(Debug, Clone)]
pub struct DocumentSigner {
    key: SigningKeyMaterial,
    ecdsa_encoding: EcdsaEncoding,
}

impl DocumentSigner {
    /// Create a signer from already-loaded key material
    pub fn new(key: SigningKeyMaterial) -> Self {
        Self {
            key,
            ecdsa_encoding: EcdsaEncoding::default(),
        }
    }

    /// Load the private key from PEM (optionally password protected)
    pub fn from_pem(pem: &str, password: Option<&str>) -> Result<Self> {
        SigningKeyMaterial::from_pem(pem, password).map(Self::new)
    }

    /// Choose DER instead of P1363 for ECDSA output
    pub fn with_ecdsa_encoding(mut self, encoding: EcdsaEncoding) -> Self {
        self.ecdsa_encoding = encoding;
        self
    }

    /// Algorithm this signer will use
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self.key {
            SigningKeyMaterial::Rsa(_) => SignatureAlgorithm::RsaPss,
            SigningKeyMaterial::EcP256(_) => SignatureAlgorithm::EcdsaP256,
        }
    }

    /// Sign the SHA-256 digest of `canonical_path`
    pub fn sign(&self, canonical_path: &str) -> Result<Signature> {
        let digest = sha256(canonical_path.as_bytes());
        let bytes = match &self.key {
            SigningKeyMaterial::Rsa(key) => {
                let padding = Pss::new_with_salt::<Sha256>(PSS_SALT_LEN);
                key.sign_with_rng(&mut OsRng, padding, digest.as_bytes())
                    .map_err(|e| CryptoError::Signing(e.to_string()))?
            }
            SigningKeyMaterial::EcP256(secret) => {
                let signing_key = SigningKey::from(secret);
                match self.ecdsa_encoding {
                    EcdsaEncoding::IeeeP1363 => {
                        let signature: P256Signature = signing_key
                            .sign_prehash(digest.as_bytes())
                            .map_err(|e| CryptoError::Signing(e.to_string()))?;
                        let raw = signature.to_bytes().to_vec();
                        if raw.len() != P1363_SIGNATURE_LEN {
                            return Err(CryptoError::SignatureLengthMismatch {
                                expected: P1363_SIGNATURE_LEN,
                                actual: raw.len(),
                            });
                        }
                        raw
                    }
                    EcdsaEncoding::Der => {
                        let signature: DerSignature = signing_key
                            .sign_prehash(digest.as_bytes())
                            .map_err(|e| CryptoError::Signing(e.to_string()))?;
                        signature.as_bytes().to_vec()
                    }
                }
            }
        };
        debug!(algorithm = ?self.algorithm(), len = bytes.len(), "signed verification path");
        Ok(Signature {
            algorithm: self.algorithm(),
            value_base64url: base64url_encode(&bytes),
        })
    }
}

/// Sign `canonical_path` with a PEM private key
pub fn sign(
    canonical_path: &str,
    private_key_pem: &str,
    password: Option<&str>,
) -> Result<Signature> {
    DocumentSigner::from_pem(private_key_pem, password)?.sign(canonical_path)
}

/// Extract the DER SubjectPublicKeyInfo from a certificate or SPKI PEM
fn public_key_der(pem: &str) -> Result<Vec<u8>> {
    if pem.contains(PEM_CERTIFICATE) {
        let cert = parse_certificate(pem)?;
        return cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()));
    }
    let (_, doc) = rsa::pkcs8::Document::from_pem(pem.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("malformed PEM: {}", e)))?;
    Ok(doc.as_bytes().to_vec())
}

/// Verify an RSA-PSS signature over `path`
///
/// Any parsing or verification failure yields `false`.
pub fn verify(path: &str, signature_base64url: &str, public_key_pem: &str) -> bool {
    (|| -> Result<bool> {
        let key = RsaPublicKey::from_public_key_der(&public_key_der(public_key_pem)?)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let signature = base64url_decode(signature_base64url)?;
        let digest = sha256(path.as_bytes());
        Ok(key
            .verify(Pss::new_with_salt::<Sha256>(PSS_SALT_LEN), digest.as_bytes(), &signature)
            .is_ok())
    })()
    .unwrap_or(false)
}

/// Verify an ECDSA P-256 signature (P1363 or DER) over `path`
///
/// Any parsing or verification failure yields `false`.
pub fn verify_ecdsa(path: &str, signature_base64url: &str, public_key_pem: &str) -> bool {
    (|| -> Result<bool> {
        let key = VerifyingKey::from_public_key_der(&public_key_der(public_key_pem)?)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let raw = base64url_decode(signature_base64url)?;
        let signature = if raw.len() == P1363_SIGNATURE_LEN {
            P256Signature::from_slice(&raw)
        } else {
            P256Signature::from_der(&raw)
        }
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
        let digest = sha256(path.as_bytes());
        Ok(key.verify_prehash(digest.as_bytes(), &signature).is_ok())
    })()
    .unwrap_or(false)
}
