//! # KSeF Client SDK
//!
//! Stateful client components for submitting e-invoices to KSeF.
//!
//! ## Features
//!
//! - **Public key cache**: platform certificates fetched once per usage and kept until they expire
//! - **Session keys**: fresh AES-256 material per session, wrapped for the platform
//! - **Admission control**: per-second, per-minute and per-hour request windows plus a session gate
//! - **Transport**: retries network failures, 5xx and 429 with exponential backoff
//!
//! ## Example
//!
//! ```rust,ignore
//! use ksef_client::{Config, KsefClient};
//! use ksef_crypto::PayloadEncryptor;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = KsefClient::new(Config::new("https://ksef-test.mf.gov.pl/api/v2"))?;
//!
//!     // Answer the authentication challenge
//!     let encrypted_token = client.encrypt_ksef_token(&token, challenge.timestamp).await?;
//!
//!     // Open a session and encrypt an invoice under its key
//!     let session = client.open_session().await?;
//!     let payload = PayloadEncryptor::new(&session.material).encrypt(invoice_xml, None, None);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
pub mod public_keys;
pub mod rate_limit;
mod session;
mod transport;
mod types;

pub use client::KsefClient;
pub use config::{Config, RateLimitConfig};
pub use error::{ClientError, Result};
pub use public_keys::{CertificateSource, HttpCertificateSource, PublicKeyProvider};
pub use rate_limit::{RateLimitStatus, RateLimiter, RateWindowKind, SessionPermit};
pub use session::SymmetricKeyManager;
pub use transport::HttpTransport;
pub use types::*;
