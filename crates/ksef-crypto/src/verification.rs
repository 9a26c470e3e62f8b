//! Verification-code links
//!
//! Printed invoices carry a link the recipient can open to check the
//! document. Code I identifies an invoice already accepted by the platform.
//! Code II, used for documents issued offline, additionally identifies the
//! issuer's certificate and carries a signature over the link itself.

use crate::{
    hashing::sha256_base64url,
    keys::parse_certificate,
    signing::{canonicalize_path, verify, verify_ecdsa, DocumentSigner},
    CryptoError, Result,
};
use chrono::NaiveDate;
use std::fmt;
use tracing::debug;

/// Date format used in Code I links
pub const INVOICE_DATE_FORMAT: &str = "%d-%m-%Y";

/// Kind of identifier the issuer acts under
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextIdentifierType {
    Nip,
    InternalId,
    NipVatUe,
    PeppolId,
}

impl ContextIdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nip => "Nip",
            Self::InternalId => "InternalId",
            Self::NipVatUe => "NipVatUe",
            Self::PeppolId => "PeppolId",
        }
    }
}

impl fmt::Display for ContextIdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate and private key used to sign Code II links
#[derive(Debug, Clone)]
pub struct OfflineCertificate {
    serial_hex: String,
    signer: DocumentSigner,
}

impl OfflineCertificate {
    /// Load the certificate and its private key
    pub fn from_pem(
        certificate_pem: &str,
        private_key_pem: &str,
        password: Option<&str>,
    ) -> Result<Self> {
        let certificate = parse_certificate(certificate_pem)?;
        let serial_hex = serial_to_hex(certificate.tbs_certificate.serial_number.as_bytes());
        let signer = DocumentSigner::from_pem(private_key_pem, password)?;
        Ok(Self { serial_hex, signer })
    }

    /// Certificate serial number, uppercase hex
    pub fn serial_hex(&self) -> &str {
        &self.serial_hex
    }

    pub fn signer(&self) -> &DocumentSigner {
        &self.signer
    }
}

fn serial_to_hex(bytes: &[u8]) -> String {
    // DER integers carry a leading zero octet when the high bit is set
    let trimmed = match bytes {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => bytes,
    };
    hex::encode_upper(trimmed)
}

/// Build a Code I link for an invoice accepted online
pub fn invoice_verification_url(
    base_url: &str,
    seller_tax_id: &str,
    issue_date: NaiveDate,
    document: &[u8],
) -> String {
    format!(
        "{}/invoice/{}/{}/{}",
        base_url.trim_end_matches('/'),
        seller_tax_id,
        issue_date.format(INVOICE_DATE_FORMAT),
        sha256_base64url(document)
    )
}

/// Build a signed Code II link for a document issued offline
///
/// Fails with [`CryptoError::MissingCertificateForOfflineSigning`] before any
/// hashing or signing when no certificate is supplied.
pub fn certificate_verification_url(
    base_url: &str,
    context_type: ContextIdentifierType,
    context_value: &str,
    seller_tax_id: &str,
    document: &[u8],
    certificate: Option<&OfflineCertificate>,
) -> Result<String> {
    let certificate = certificate.ok_or(CryptoError::MissingCertificateForOfflineSigning)?;
    let unsigned = format!(
        "{}/certificate/{}/{}/{}/{}/{}",
        base_url.trim_end_matches('/'),
        context_type,
        context_value,
        seller_tax_id,
        certificate.serial_hex,
        sha256_base64url(document)
    );
    let signature = certificate.signer.sign(canonicalize_path(&unsigned))?;
    debug!(serial = %certificate.serial_hex, "signed offline verification link");
    Ok(format!("{}/{}", unsigned, signature.value_base64url))
}

/// Check the signature segment of a Code II link
///
/// `public_key_pem` may be the issuer's certificate or SPKI key, RSA or P-256.
pub fn verify_certificate_url(url: &str, public_key_pem: &str) -> bool {
    let Some((unsigned, signature)) = url.trim_end_matches('/').rsplit_once('/') else {
        return false;
    };
    let path = canonicalize_path(unsigned);
    verify(path, signature, public_key_pem) || verify_ecdsa(path, signature, public_key_pem)
}
