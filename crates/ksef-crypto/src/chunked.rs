//! Batch chunking
//!
//! Batch submissions upload one large archive as a sequence of parts. The
//! buffer is cut into fixed-size, non-overlapping windows starting at offset
//! zero, numbered from 1, and described by a manifest holding the SHA-256 of
//! each part and of the whole.
//!
//! ## Encrypted batches
//!
//! [`split_encrypted`] encrypts each window separately under the session
//! key material. The manifest then records the hash and size of each
//! *encrypted* part, while `file_hash` and `file_size` still describe the
//! unencrypted archive.

use crate::{
    hashing::{sha256_base64, IncrementalHasher},
    symmetric::{aes_cbc_decrypt, aes_cbc_encrypt, SymmetricKeyMaterial},
    CryptoError, Result,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default part size: 5 MiB
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// Manifest entry for one part
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePart {
    /// 1-based position of the part
    pub ordinal_number: u32,
    /// Part size in bytes
    pub file_size: u64,
    /// SHA-256 of the part, base64
    pub file_hash: String,
}

/// Hash manifest of a split buffer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchManifest {
    /// Size of the whole buffer
    pub file_size: u64,
    /// SHA-256 of the whole buffer, base64
    pub file_hash: String,
    /// Parts in ordinal order
    pub file_parts: Vec<FilePart>,
}

/// One part's bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPart {
    pub ordinal_number: u32,
    pub data: Vec<u8>,
}

/// Result of splitting a buffer
#[derive(Clone, Debug)]
pub struct ChunkedBatch {
    pub manifest: BatchManifest,
    pub parts: Vec<BatchPart>,
}

impl ChunkedBatch {
    /// Number of parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Split `buffer` into `part_size` windows
pub fn split(buffer: &[u8], part_size: usize) -> Result<ChunkedBatch> {
    split_with(buffer, part_size, |window| Ok(window.to_vec()))
}

/// Split `buffer` and encrypt each window under `material`
pub fn split_encrypted(
    buffer: &[u8],
    material: &SymmetricKeyMaterial,
    part_size: usize,
) -> Result<ChunkedBatch> {
    split_with(buffer, part_size, |window| {
        Ok(aes_cbc_encrypt(material.key(), material.iv(), window))
    })
}

fn split_with<F>(buffer: &[u8], part_size: usize, mut transform: F) -> Result<ChunkedBatch>
where
    F: FnMut(&[u8]) -> Result<Vec<u8>>,
{
    if part_size == 0 {
        return Err(CryptoError::InvalidChunkSize(part_size));
    }

    let mut file_parts = Vec::with_capacity(buffer.len().div_ceil(part_size));
    let mut parts = Vec::with_capacity(file_parts.capacity());
    for (index, window) in buffer.chunks(part_size).enumerate() {
        let ordinal_number = u32::try_from(index + 1)
            .map_err(|_| CryptoError::InvalidChunkSize(part_size))?;
        let data = transform(window)?;
        file_parts.push(FilePart {
            ordinal_number,
            file_size: data.len() as u64,
            file_hash: sha256_base64(&data),
        });
        parts.push(BatchPart { ordinal_number, data });
    }

    debug!(
        file_size = buffer.len(),
        part_size,
        parts = parts.len(),
        "split batch"
    );

    Ok(ChunkedBatch {
        manifest: BatchManifest {
            file_size: buffer.len() as u64,
            file_hash: sha256_base64(buffer),
            file_parts,
        },
        parts,
    })
}

impl BatchManifest {
    /// Number of parts
    pub fn part_count(&self) -> usize {
        self.file_parts.len()
    }

    /// Concatenate plaintext parts in ordinal order, checking every hash
    pub fn reassemble(&self, parts: &[BatchPart]) -> Result<Vec<u8>> {
        self.reassemble_with(parts, |data| Ok(data.to_vec()))
    }

    /// Decrypt and concatenate parts produced by [`split_encrypted`]
    pub fn reassemble_encrypted(
        &self,
        parts: &[BatchPart],
        material: &SymmetricKeyMaterial,
    ) -> Result<Vec<u8>> {
        self.reassemble_with(parts, |data| aes_cbc_decrypt(material.key(), material.iv(), data))
    }

    fn reassemble_with<F>(&self, parts: &[BatchPart], mut transform: F) -> Result<Vec<u8>>
    where
        F: FnMut(&[u8]) -> Result<Vec<u8>>,
    {
        if parts.len() != self.file_parts.len() {
            return Err(CryptoError::InvalidPartSequence(format!(
                "manifest lists {} parts, got {}",
                self.file_parts.len(),
                parts.len()
            )));
        }

        let mut ordered: Vec<&BatchPart> = parts.iter().collect();
        ordered.sort_by_key(|part| part.ordinal_number);

        let mut hasher = IncrementalHasher::new();
        let mut out = Vec::with_capacity(parts.iter().map(|part| part.data.len()).sum());
        for (part, expected) in ordered.into_iter().zip(&self.file_parts) {
            if part.ordinal_number != expected.ordinal_number {
                return Err(CryptoError::InvalidPartSequence(format!(
                    "expected part {}, got {}",
                    expected.ordinal_number, part.ordinal_number
                )));
            }
            let actual = sha256_base64(&part.data);
            if actual != expected.file_hash {
                return Err(CryptoError::HashMismatch {
                    expected: expected.file_hash.clone(),
                    actual,
                });
            }
            let plain = transform(&part.data)?;
            hasher.update(&plain);
            out.extend_from_slice(&plain);
        }

        let actual_size = out.len() as u64;
        if actual_size != self.file_size {
            return Err(CryptoError::SizeMismatch {
                expected: self.file_size,
                actual: actual_size,
            });
        }

        let whole = hasher.finalize().to_base64();
        if whole != self.file_hash {
            return Err(CryptoError::HashMismatch {
                expected: self.file_hash.clone(),
                actual: whole,
            });
        }
        Ok(out)
    }
}
