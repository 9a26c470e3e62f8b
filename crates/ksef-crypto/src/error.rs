//! Error types for the ksef-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Invalid key format, type or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Challenge timestamp could not be normalized to epoch milliseconds
    #[error("invalid challenge timestamp: {0}")]
    InvalidTimestamp(String),

    /// Signing failed
    #[error("signing failed: {0}")]
    Signing(String),

    /// A fixed-size ECDSA signature did not have the expected length
    #[error("signature length mismatch: expected {expected} bytes, got {actual}")]
    SignatureLengthMismatch { expected: usize, actual: usize },

    /// Offline verification code requested without a signing certificate
    #[error("a certificate is required to sign offline verification codes")]
    MissingCertificateForOfflineSigning,

    /// Invalid certificate
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Hash verification failed
    #[error("hash verification failed: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Reassembled data does not have the declared size
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Invalid chunk size
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Batch parts do not form a contiguous 1-based sequence
    #[error("invalid batch part sequence: {0}")]
    InvalidPartSequence(String),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
