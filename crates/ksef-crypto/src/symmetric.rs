//! Symmetric encryption using AES-256-CBC
//!
//! Each interactive or batch session uses one random 256-bit key and one
//! 128-bit IV. The key travels to the platform wrapped with RSA-OAEP under the
//! platform's `SymmetricKeyEncryption` certificate; the IV travels in clear.

use crate::{CryptoError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-CBC initialization vector in bytes (128 bits)
pub const IV_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Session fields sent when opening a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    /// RSA-OAEP wrapped AES key, base64
    pub encrypted_symmetric_key: String,
    /// AES-CBC IV, base64
    pub initialization_vector: String,
}

/// Per-session AES key material
///
/// Created once per session and never mutated afterwards. The raw key is
/// wiped from memory when the material is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKeyMaterial {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
    #[zeroize(skip)]
    wrapped_key_base64: String,
    #[zeroize(skip)]
    iv_base64: String,
}

impl SymmetricKeyMaterial {
    /// Generate a fresh key and IV and wrap the key for `recipient`
    pub fn generate(recipient: &RsaPublicKey) -> Result<Self> {
        let mut key = [0u8; KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        let material = Self::from_parts(key, iv, recipient);
        key.zeroize();
        material
    }

    /// Build material from an existing key and IV, wrapping the key for `recipient`
    pub fn from_parts(
        key: [u8; KEY_SIZE],
        iv: [u8; IV_SIZE],
        recipient: &RsaPublicKey,
    ) -> Result<Self> {
        let wrapped = wrap_key(recipient, &key)?;
        Ok(Self {
            key,
            iv,
            wrapped_key_base64: STANDARD.encode(wrapped),
            iv_base64: STANDARD.encode(iv),
        })
    }

    /// Get the raw AES key
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Get the raw IV
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Wrapped key, base64
    pub fn wrapped_key_base64(&self) -> &str {
        &self.wrapped_key_base64
    }

    /// IV, base64
    pub fn iv_base64(&self) -> &str {
        &self.iv_base64
    }

    /// Fields for the session-open request
    pub fn encryption_info(&self) -> EncryptionInfo {
        EncryptionInfo {
            encrypted_symmetric_key: self.wrapped_key_base64.clone(),
            initialization_vector: self.iv_base64.clone(),
        }
    }
}

impl std::fmt::Debug for SymmetricKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKeyMaterial")
            .field("key", &"<redacted>")
            .field("iv", &self.iv_base64)
            .finish()
    }
}

/// Encrypt `data` with RSA-OAEP (SHA-256 digest, MGF1-SHA-256)
pub fn rsa_oaep_encrypt(recipient: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>> {
    recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Decrypt RSA-OAEP (SHA-256) ciphertext
pub fn rsa_oaep_decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    key.decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

/// Wrap a symmetric key for the holder of the matching private key
pub fn wrap_key(recipient: &RsaPublicKey, key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
    rsa_oaep_encrypt(recipient, key)
}

/// Recover a wrapped symmetric key
pub fn unwrap_key(key: &RsaPrivateKey, wrapped_base64: &str) -> Result<[u8; KEY_SIZE]> {
    let wrapped = STANDARD.decode(wrapped_base64)?;
    let mut raw = rsa_oaep_decrypt(key, &wrapped)?;
    if raw.len() != KEY_SIZE {
        let len = raw.len();
        raw.zeroize();
        return Err(CryptoError::InvalidKey(format!(
            "unwrapped key must be {} bytes, got {}",
            KEY_SIZE, len
        )));
    }
    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(&raw);
    raw.zeroize();
    Ok(out)
}

/// AES-256-CBC with PKCS#7 padding
pub fn aes_cbc_encrypt(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Reverse of [`aes_cbc_encrypt`]
pub fn aes_cbc_decrypt(
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::test_keys::{private_key, public_key};
    use super::*;

    #[test]
    fn test_material_sizes_and_unwrap() {
        let material = SymmetricKeyMaterial::generate(&public_key()).unwrap();
        assert_eq!(material.key().len(), KEY_SIZE);
        assert_eq!(material.iv().len(), IV_SIZE);

        let unwrapped = unwrap_key(private_key(), material.wrapped_key_base64()).unwrap();
        assert_eq!(&unwrapped, material.key());

        let iv = STANDARD.decode(material.iv_base64()).unwrap();
        assert_eq!(iv.as_slice(), material.iv());
    }

    #[test]
    fn test_materials_are_independent() {
        let a = SymmetricKeyMaterial::generate(&public_key()).unwrap();
        let b = SymmetricKeyMaterial::generate(&public_key()).unwrap();
        assert_ne!(a.key(), b.key());
        assert_ne!(a.iv(), b.iv());
        assert_ne!(a.wrapped_key_base64(), b.wrapped_key_base64());
    }

    #[test]
    fn test_encryption_info_fields() {
        let material = SymmetricKeyMaterial::generate(&public_key()).unwrap();
        let json = serde_json::to_value(material.encryption_info()).unwrap();
        assert_eq!(json["encryptedSymmetricKey"], material.wrapped_key_base64());
        assert_eq!(json["initializationVector"], material.iv_base64());
    }

    #[test]
    fn test_debug_redacts_key() {
        let material =
            SymmetricKeyMaterial::from_parts([7u8; KEY_SIZE], [1u8; IV_SIZE], &public_key())
                .unwrap();
        let debug = format!("{:?}", material);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("[7, 7"));
    }

    #[test]
    fn test_aes_cbc_roundtrip() {
        let key = [0x42u8; KEY_SIZE];
        let iv = [0x24u8; IV_SIZE];
        let plaintext = b"<Faktura>Hello</Faktura>";
        let ciphertext = aes_cbc_encrypt(&key, &iv, plaintext);
        assert_eq!(ciphertext.len() % 16, 0);
        assert!(ciphertext.len() > plaintext.len());
        assert_eq!(aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_aes_cbc_pads_full_block() {
        let key = [1u8; KEY_SIZE];
        let iv = [2u8; IV_SIZE];
        assert_eq!(aes_cbc_encrypt(&key, &iv, &[]).len(), 16);
        assert_eq!(aes_cbc_encrypt(&key, &iv, &[0u8; 16]).len(), 32);
    }

    #[test]
    fn test_aes_cbc_wrong_key_fails_or_differs() {
        let iv = [0u8; IV_SIZE];
        let ciphertext = aes_cbc_encrypt(&[1u8; KEY_SIZE], &iv, b"secret invoice");
        match aes_cbc_decrypt(&[2u8; KEY_SIZE], &iv, &ciphertext) {
            Ok(plain) => assert_ne!(plain, b"secret invoice"),
            Err(CryptoError::Decryption(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = [3u8; KEY_SIZE];
        let iv = [4u8; IV_SIZE];
        let ciphertext = aes_cbc_encrypt(&key, &iv, b"0123456789abcdef0123");
        assert!(aes_cbc_decrypt(&key, &iv, &ciphertext[..ciphertext.len() - 1]).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_aes_cbc_roundtrip(
            data in proptest::collection::vec(proptest::num::u8::ANY, 0..2048)
        ) {
            let key = [9u8; KEY_SIZE];
            let iv = [8u8; IV_SIZE];
            let ciphertext = aes_cbc_encrypt(&key, &iv, &data);
            proptest::prop_assert_eq!(aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap(), data);
        }
    }
}
