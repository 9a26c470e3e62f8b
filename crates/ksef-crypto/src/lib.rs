//! # KSeF Crypto
//!
//! Client-side cryptographic primitives for the KSeF e-invoicing platform.
//!
//! This crate provides:
//! - **Session keys**: AES-256-CBC key material wrapped with RSA-OAEP (SHA-256)
//! - **Document envelope**: encrypted invoices with plaintext and ciphertext hashes
//! - **Challenge tokens**: `token|timestamp` encrypted for token authentication
//! - **Verification codes**: Code I links and signed Code II links (RSA-PSS or ECDSA P-256)
//! - **Batch chunking**: ordinal parts with a SHA-256 manifest
//!
//! Everything here is synchronous and free of I/O. Fetching the platform's
//! certificates and pacing requests live in `ksef-client`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ksef_crypto::{load_rsa_public_key, PayloadEncryptor, SymmetricKeyMaterial};
//!
//! let platform_key = load_rsa_public_key(&certificate_pem)?;
//! let material = SymmetricKeyMaterial::generate(&platform_key)?;
//! let payload = PayloadEncryptor::new(&material).encrypt(invoice_xml, None, None);
//! ```

pub mod challenge;
pub mod chunked;
pub mod envelope;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod signing;
pub mod symmetric;
pub mod verification;

pub use challenge::{compose_token_payload, encrypt_token, ChallengeTimestamp};
pub use chunked::{
    split, split_encrypted, BatchManifest, BatchPart, ChunkedBatch, FilePart, DEFAULT_PART_SIZE,
};
pub use envelope::{EncryptedPayload, PayloadEncryptor};
pub use error::{CryptoError, Result};
pub use hashing::{sha256, sha256_base64, sha256_base64url, IncrementalHasher, Sha256Hash};
pub use keys::{
    certificate_to_pem, detect_key_kind, load_rsa_public_key, parse_certificate, KeyKind,
    SigningKeyMaterial,
};
pub use signing::{canonicalize_path, DocumentSigner, EcdsaEncoding, Signature, SignatureAlgorithm};
pub use symmetric::{EncryptionInfo, SymmetricKeyMaterial, IV_SIZE, KEY_SIZE};
pub use verification::{
    certificate_verification_url, invoice_verification_url, verify_certificate_url,
    ContextIdentifierType, OfflineCertificate,
};
