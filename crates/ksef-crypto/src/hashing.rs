//! Hashing utilities using SHA-256
//!
//! Every integrity value exchanged with the platform is a SHA-256 digest
//! encoded as standard base64 (document hashes, batch part hashes) or as
//! unpadded base64url (digests embedded in verification-code links).

use crate::{CryptoError, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of a SHA-256 hash output in bytes (256 bits)
pub const HASH_BYTE_SIZE: usize = 32;

/// Type alias for hash output bytes
pub type HashOutput = [u8; HASH_BYTE_SIZE];

/// A SHA-256 hash wrapper with the encodings the platform expects
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Hash(HashOutput);

impl Sha256Hash {
    /// Create a new hash from bytes
    pub fn new(bytes: HashOutput) -> Self {
        Self(bytes)
    }

    /// Parse a standard base64 encoded hash
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = STANDARD.decode(s)?;
        if bytes.len() != HASH_BYTE_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "hash must be {} bytes, got {}",
                HASH_BYTE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; HASH_BYTE_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &HashOutput {
        &self.0
    }

    /// Standard base64 with padding
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// URL-safe base64 without padding
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Hash({})", self.to_base64())
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl AsRef<[u8]> for Sha256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<HashOutput> for Sha256Hash {
    fn from(bytes: HashOutput) -> Self {
        Self(bytes)
    }
}

/// An incremental hasher for data that arrives in pieces
pub struct IncrementalHasher {
    hasher: Sha256,
    bytes_processed: u64,
}

impl IncrementalHasher {
    /// Create a new incremental hasher
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes_processed: 0,
        }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;
    }

    /// Finalize and return the hash
    pub fn finalize(self) -> Sha256Hash {
        Sha256Hash(self.hasher.finalize().into())
    }

    /// Get the number of bytes processed
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash the given data using SHA-256
pub fn sha256(data: &[u8]) -> Sha256Hash {
    Sha256Hash(Sha256::digest(data).into())
}

/// SHA-256 of `data`, standard base64 encoded
pub fn sha256_base64(data: &[u8]) -> String {
    sha256(data).to_base64()
}

/// SHA-256 of `data`, unpadded base64url encoded
pub fn sha256_base64url(data: &[u8]) -> String {
    sha256(data).to_base64url()
}

/// Encode bytes as unpadded base64url
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode unpadded base64url
pub fn base64url_decode(s: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(s.trim_end_matches('='))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_hash() {
        assert_eq!(
            sha256_base64(&[]),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_base64url_has_no_padding_or_unsafe_chars() {
        let encoded = sha256_base64url(b"Hello, World!");
        assert_eq!(encoded.len(), 43);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut hasher = IncrementalHasher::new();
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(hasher.bytes_processed(), 13);
        assert_eq!(hasher.finalize(), sha256(b"Hello, World!"));
    }

    #[test]
    fn test_base64_parse() {
        let hash = sha256(b"test");
        let parsed = Sha256Hash::from_base64(&hash.to_base64()).unwrap();
        assert_eq!(hash, parsed);
        assert!(Sha256Hash::from_base64("AAAA").is_err());
    }

    #[test]
    fn test_base64url_decode_accepts_padded_input() {
        let raw = [0xfbu8, 0xff, 0xfe];
        assert_eq!(base64url_decode(&base64url_encode(&raw)).unwrap(), raw);
        assert_eq!(base64url_decode("-__-").unwrap(), raw);
        assert_eq!(base64url_decode("AA==").unwrap(), vec![0u8]);
    }
}
