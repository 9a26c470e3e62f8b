//! Document envelope for interactive submission
//!
//! An invoice is sent as AES-256-CBC ciphertext together with the SHA-256
//! hash and size of both the plaintext and the ciphertext. Corrections carry
//! the hash of the document they correct.

use crate::{
    hashing::sha256_base64,
    symmetric::{aes_cbc_decrypt, aes_cbc_encrypt, SymmetricKeyMaterial},
    CryptoError, Result,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Encrypted document ready for the send-document request
///
/// Serializes with the platform's field names; absent optional fields are
/// omitted rather than sent as `null` or `false`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// SHA-256 of the plaintext, base64
    #[serde(rename = "invoiceHash")]
    pub plain_hash: String,
    /// Plaintext size in bytes
    #[serde(rename = "invoiceSize")]
    pub plain_size: u64,
    /// SHA-256 of the ciphertext, base64
    #[serde(rename = "encryptedInvoiceHash")]
    pub cipher_hash: String,
    /// Ciphertext size in bytes
    #[serde(rename = "encryptedInvoiceSize")]
    pub cipher_size: u64,
    /// Ciphertext, base64
    #[serde(rename = "encryptedInvoiceContent")]
    pub cipher_base64: String,
    /// Offline-mode marker, passed through untouched
    #[serde(rename = "offlineMode", skip_serializing_if = "Option::is_none", default)]
    pub offline_flag: Option<bool>,
    /// Hash of the document being corrected, base64
    #[serde(rename = "hashOfCorrectedInvoice", skip_serializing_if = "Option::is_none", default)]
    pub corrected_doc_hash: Option<String>,
}

/// Encrypts documents under a session's key material
pub struct PayloadEncryptor<'a> {
    material: &'a SymmetricKeyMaterial,
}

impl<'a> PayloadEncryptor<'a> {
    /// Create an encryptor bound to one session's material
    pub fn new(material: &'a SymmetricKeyMaterial) -> Self {
        Self { material }
    }

    /// Encrypt a document
    pub fn encrypt(
        &self,
        document: &[u8],
        offline_flag: Option<bool>,
        corrected_doc_hash: Option<String>,
    ) -> EncryptedPayload {
        encrypt(document, self.material, offline_flag, corrected_doc_hash)
    }

    /// Encrypt a correction, referencing the original by hash
    pub fn encrypt_correction(
        &self,
        correction_doc: &[u8],
        original_doc: &[u8],
        offline_flag: Option<bool>,
    ) -> EncryptedPayload {
        encrypt_correction(correction_doc, original_doc, self.material, offline_flag)
    }

    /// Decrypt a payload produced under the same material
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        decrypt_payload(payload, self.material)
    }
}

/// Encrypt `document` and compute its integrity fields
pub fn encrypt(
    document: &[u8],
    material: &SymmetricKeyMaterial,
    offline_flag: Option<bool>,
    corrected_doc_hash: Option<String>,
) -> EncryptedPayload {
    let ciphertext = aes_cbc_encrypt(material.key(), material.iv(), document);
    EncryptedPayload {
        plain_hash: sha256_base64(document),
        plain_size: document.len() as u64,
        cipher_hash: sha256_base64(&ciphertext),
        cipher_size: ciphertext.len() as u64,
        cipher_base64: STANDARD.encode(&ciphertext),
        offline_flag,
        corrected_doc_hash,
    }
}

/// Encrypt `correction_doc`, recording the hash of `original_doc`
///
/// The correction is what gets encrypted; the original only contributes
/// its hash.
pub fn encrypt_correction(
    correction_doc: &[u8],
    original_doc: &[u8],
    material: &SymmetricKeyMaterial,
    offline_flag: Option<bool>,
) -> EncryptedPayload {
    let original_hash = sha256_base64(original_doc);
    encrypt(correction_doc, material, offline_flag, Some(original_hash))
}

/// Decrypt raw ciphertext produced under `material`
pub fn decrypt(ciphertext: &[u8], material: &SymmetricKeyMaterial) -> Result<Vec<u8>> {
    aes_cbc_decrypt(material.key(), material.iv(), ciphertext)
}

/// Decrypt a payload after checking its ciphertext hash and size
pub fn decrypt_payload(
    payload: &EncryptedPayload,
    material: &SymmetricKeyMaterial,
) -> Result<Vec<u8>> {
    let ciphertext = STANDARD.decode(&payload.cipher_base64)?;
    let actual = sha256_base64(&ciphertext);
    if actual != payload.cipher_hash {
        return Err(CryptoError::HashMismatch {
            expected: payload.cipher_hash.clone(),
            actual,
        });
    }
    if ciphertext.len() as u64 != payload.cipher_size {
        return Err(CryptoError::Decryption(format!(
            "ciphertext is {} bytes, payload declares {}",
            ciphertext.len(),
            payload.cipher_size
        )));
    }
    let plaintext = decrypt(&ciphertext, material)?;
    let plain_hash = sha256_base64(&plaintext);
    if plain_hash != payload.plain_hash {
        return Err(CryptoError::HashMismatch {
            expected: payload.plain_hash.clone(),
            actual: plain_hash,
        });
    }
    Ok(plaintext)
}
