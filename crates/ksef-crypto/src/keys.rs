//! Key and certificate loading
//!
//! The platform publishes its encryption keys as X.509 certificates (base64
//! DER). Callers sign verification codes with their own private keys, which
//! may be RSA or P-256, PKCS#1, SEC1 or PKCS#8, optionally password protected.
//! The key type is decided by introspecting the decoded structure rather than
//! trusting the PEM label alone.

use crate::{CryptoError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePublicKey, Document, EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

/// Minimum RSA modulus size accepted for signing and key wrapping
pub const MIN_RSA_BITS: usize = 2048;

/// Line width of PEM bodies
const PEM_LINE_WIDTH: usize = 64;

pub(crate) const PEM_CERTIFICATE: &str = "CERTIFICATE";
const PEM_PUBLIC_KEY: &str = "PUBLIC KEY";
const PEM_RSA_PUBLIC_KEY: &str = "RSA PUBLIC KEY";
const PEM_PRIVATE_KEY: &str = "PRIVATE KEY";
const PEM_ENCRYPTED_PRIVATE_KEY: &str = "ENCRYPTED PRIVATE KEY";
const PEM_RSA_PRIVATE_KEY: &str = "RSA PRIVATE KEY";
const PEM_EC_PRIVATE_KEY: &str = "EC PRIVATE KEY";

/// Wrap DER bytes in a PEM envelope with a 64-column body
pub fn der_to_pem(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem =
        String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 2 * label.len() + 40);
    pem.push_str("-----BEGIN ");
    pem.push_str(label);
    pem.push_str("-----\n");
    // base64 output is ASCII, so byte chunks are valid str boundaries
    for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END ");
    pem.push_str(label);
    pem.push_str("-----\n");
    pem
}

/// Convert a base64 DER certificate (as listed by the platform) to PEM
pub fn certificate_to_pem(certificate_base64: &str) -> Result<String> {
    let compact: String = certificate_base64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let der = STANDARD.decode(compact)?;
    if der.is_empty() {
        return Err(CryptoError::InvalidCertificate("empty certificate".to_string()));
    }
    Ok(der_to_pem(PEM_CERTIFICATE, &der))
}

/// Decode a PEM document into its label and DER bytes
fn decode_pem(pem: &str) -> Result<(String, Document)> {
    let (label, doc) = Document::from_pem(pem.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("malformed PEM: {}", e)))?;
    Ok((label.to_string(), doc))
}

/// Parse an X.509 certificate from PEM
pub fn parse_certificate(pem: &str) -> Result<Certificate> {
    let (label, doc) = decode_pem(pem)?;
    if label != PEM_CERTIFICATE {
        return Err(CryptoError::InvalidCertificate(format!(
            "expected CERTIFICATE, found {}",
            label
        )));
    }
    Certificate::from_der(doc.as_bytes())
        .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))
}

/// Load an RSA public key from a certificate, SPKI or PKCS#1 PEM
pub fn load_rsa_public_key(pem: &str) -> Result<RsaPublicKey> {
    let (label, doc) = decode_pem(pem)?;
    let key = match label.as_str() {
        PEM_CERTIFICATE => {
            let cert = Certificate::from_der(doc.as_bytes())
                .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
            let spki = cert
                .tbs_certificate
                .subject_public_key_info
                .to_der()
                .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
            RsaPublicKey::from_public_key_der(&spki)
                .map_err(|e| CryptoError::InvalidKey(format!("certificate key is not RSA: {}", e)))?
        }
        PEM_PUBLIC_KEY => RsaPublicKey::from_public_key_der(doc.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        PEM_RSA_PUBLIC_KEY => RsaPublicKey::from_pkcs1_der(doc.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        other => {
            return Err(CryptoError::InvalidKey(format!(
                "unsupported public key PEM label: {}",
                other
            )))
        }
    };
    Ok(key)
}

/// A private key usable for verification-code signing
#[derive(Clone)]
pub enum SigningKeyMaterial {
    /// RSA key, signs with RSA-PSS
    Rsa(RsaPrivateKey),
    /// NIST P-256 key, signs with ECDSA
    EcP256(p256::SecretKey),
}

impl std::fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa(key) => write!(f, "SigningKeyMaterial::Rsa({} bits)", key.size() * 8),
            Self::EcP256(_) => write!(f, "SigningKeyMaterial::EcP256"),
        }
    }
}

/// What introspection of a private key PEM concluded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// Structure identifies an RSA key
    Rsa,
    /// Structure identifies an EC key
    Ec,
    /// Nothing conclusive; callers default to RSA
    Unknown,
}

impl SigningKeyMaterial {
    /// Load a private key from PEM, decrypting PKCS#8 with `password` if needed
    pub fn from_pem(pem: &str, password: Option<&str>) -> Result<Self> {
        let (label, doc) = decode_pem(pem)?;
        match label.as_str() {
            PEM_RSA_PRIVATE_KEY => RsaPrivateKey::from_pkcs1_der(doc.as_bytes())
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))
                .and_then(Self::rsa),
            PEM_EC_PRIVATE_KEY => p256::SecretKey::from_sec1_der(doc.as_bytes())
                .map(Self::EcP256)
                .map_err(|e| CryptoError::InvalidKey(format!("not a P-256 SEC1 key: {}", e))),
            PEM_PRIVATE_KEY => Self::from_pkcs8_der(doc.as_bytes()),
            PEM_ENCRYPTED_PRIVATE_KEY => {
                let password = password.ok_or_else(|| {
                    CryptoError::InvalidKey("encrypted private key requires a password".to_string())
                })?;
                let encrypted = EncryptedPrivateKeyInfo::try_from(doc.as_bytes())
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
                let decrypted = encrypted.decrypt(password).map_err(|e| {
                    CryptoError::InvalidKey(format!("cannot decrypt private key: {}", e))
                })?;
                Self::from_pkcs8_der(decrypted.as_bytes())
            }
            other => Err(CryptoError::InvalidKey(format!(
                "unsupported private key PEM label: {}",
                other
            ))),
        }
    }

    /// Load a PKCS#8 DER private key, dispatching on its algorithm OID
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info =
            PrivateKeyInfo::try_from(der).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        match classify_oid(&info) {
            KeyKind::Ec => p256::SecretKey::try_from(info)
                .map(Self::EcP256)
                .map_err(|e| CryptoError::InvalidKey(format!("not a P-256 key: {}", e))),
            KeyKind::Rsa | KeyKind::Unknown => RsaPrivateKey::try_from(info)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))
                .and_then(Self::rsa),
        }
    }

    fn rsa(key: RsaPrivateKey) -> Result<Self> {
        let bits = key.size() * 8;
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::InvalidKey(format!(
                "RSA key must be at least {} bits, got {}",
                MIN_RSA_BITS, bits
            )));
        }
        Ok(Self::Rsa(key))
    }

    /// The kind of key this is
    pub fn kind(&self) -> KeyKind {
        match self {
            Self::Rsa(_) => KeyKind::Rsa,
            Self::EcP256(_) => KeyKind::Ec,
        }
    }
}

/// Inspect a private key PEM without fully loading it
///
/// Password-protected keys are decrypted when `password` is given; without
/// it their kind is [`KeyKind::Unknown`].
pub fn detect_key_kind(pem: &str, password: Option<&str>) -> KeyKind {
    let Ok((label, doc)) = decode_pem(pem) else {
        return KeyKind::Unknown;
    };
    match label.as_str() {
        PEM_RSA_PRIVATE_KEY => KeyKind::Rsa,
        PEM_EC_PRIVATE_KEY => KeyKind::Ec,
        PEM_PRIVATE_KEY => PrivateKeyInfo::try_from(doc.as_bytes())
            .map(|info| classify_oid(&info))
            .unwrap_or(KeyKind::Unknown),
        PEM_ENCRYPTED_PRIVATE_KEY => {
            let decrypted = password.and_then(|password| {
                EncryptedPrivateKeyInfo::try_from(doc.as_bytes())
                    .ok()?
                    .decrypt(password)
                    .ok()
            });
            let Some(decrypted) = decrypted else {
                return KeyKind::Unknown;
            };
            PrivateKeyInfo::try_from(decrypted.as_bytes())
                .map(|info| classify_oid(&info))
                .unwrap_or(KeyKind::Unknown)
        }
        _ => KeyKind::Unknown,
    }
}

fn classify_oid(info: &PrivateKeyInfo<'_>) -> KeyKind {
    let oid = info.algorithm.oid;
    if oid == p256::elliptic_curve::ALGORITHM_OID {
        KeyKind::Ec
    } else if oid == rsa::pkcs1::ALGORITHM_OID {
        KeyKind::Rsa
    } else {
        KeyKind::Unknown
    }
}
