//! End-to-end tests across ksef-crypto and ksef-client against a mock platform

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use ksef_client::{ApiRequest, ClientError, Config, KeyUsage, KsefClient, RateLimitConfig};
use ksef_crypto::{
    envelope::decrypt_payload, sha256_base64, symmetric::unwrap_key, verify_certificate_url,
    ContextIdentifierType, EncryptedPayload, OfflineCertificate, PayloadEncryptor,
};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RSA_PKCS8: &str = include_str!("../crates/ksef-crypto/tests/data/rsa_pkcs8.pem");
const RSA_CERT: &str = include_str!("../crates/ksef-crypto/tests/data/rsa_cert.pem");
const EC_SEC1: &str = include_str!("../crates/ksef-crypto/tests/data/ec_sec1.pem");
const EC_CERT: &str = include_str!("../crates/ksef-crypto/tests/data/ec_cert.pem");

const INVOICE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<Faktura xmlns="http://crd.gov.pl/wzor/2025/06/25/13775/">
  <Naglowek><KodFormularza kodSystemowy="FA (3)" wersjaSchemy="1-0E">FA</KodFormularza></Naglowek>
  <Podmiot1><DaneIdentyfikacyjne><NIP>1111111111</NIP></DaneIdentyfikacyjne></Podmiot1>
  <Fa><P_1>2026-03-15</P_1><P_2>FV/2026/03/001</P_2></Fa>
</Faktura>"#;

fn platform_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(RSA_PKCS8).unwrap()
}

fn cert_base64(pem: &str) -> String {
    pem.lines().filter(|line| !line.starts_with("-----")).collect()
}

async fn mock_platform() -> MockServer {
    let server = MockServer::start().await;
    let listing = serde_json::json!([
        {
            "certificate": cert_base64(RSA_CERT),
            "validFrom": "2025-01-01T00:00:00Z",
            "validTo": "2099-01-01T00:00:00Z",
            "usage": ["KsefTokenEncryption", "SymmetricKeyEncryption"]
        },
        {
            "certificate": cert_base64(EC_CERT),
            "validFrom": "2025-01-01T00:00:00Z",
            "validTo": "2099-01-01T00:00:00Z",
            "usage": ["Signing"]
        }
    ]);
    Mock::given(method("GET"))
        .and(path("/security/public-key-certificates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer) -> Config {
    Config::new(server.uri())
        .with_token("access-token")
        .with_retries(1, Duration::from_millis(1))
        .with_verification_base_url("https://qr-test.example.pl")
}

#[tokio::test]
async fn test_token_authentication_flow() {
    let server = mock_platform().await;
    let client = KsefClient::new(config(&server)).unwrap();

    let encrypted = client
        .encrypt_ksef_token(
            "20260315-EC-0123456789-ABCDEF0123-45|nip-1111111111",
            "2024-01-01T00:00:00Z",
        )
        .await
        .unwrap();

    let ciphertext = STANDARD.decode(encrypted).unwrap();
    let plaintext = platform_key().decrypt(Oaep::new::<Sha256>(), &ciphertext).unwrap();
    assert_eq!(
        String::from_utf8(plaintext).unwrap(),
        "20260315-EC-0123456789-ABCDEF0123-45|nip-1111111111|1704067200000"
    );
}

#[test_log::test(tokio::test)]
async fn test_interactive_session_flow() {
    let server = mock_platform().await;
    Mock::given(method("POST"))
        .and(path("/sessions/online/ref-1/invoices"))
        .and(body_partial_json(serde_json::json!({ "invoiceSize": INVOICE.len() })))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(serde_json::json!({ "referenceNumber": "inv-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = KsefClient::new(config(&server)).unwrap();
    let session = client.open_session().await.unwrap();

    // The platform recovers the session key from the open request
    let info = session.encryption_info();
    let key = unwrap_key(&platform_key(), &info.encrypted_symmetric_key).unwrap();
    assert_eq!(&key, session.material.key());
    assert_eq!(STANDARD.decode(&info.initialization_vector).unwrap(), session.material.iv());

    let payload = PayloadEncryptor::new(&session.material).encrypt(INVOICE, Some(false), None);
    let request = ApiRequest::post("/sessions/online/ref-1/invoices")
        .with_json(&payload)
        .unwrap();
    let response = client.send(request).await.unwrap();
    assert_eq!(response.status, 202);

    // What the platform received decrypts to the invoice
    let received = server.received_requests().await.unwrap();
    let sent = received
        .iter()
        .find(|r| r.url.path().ends_with("/invoices"))
        .unwrap();
    let wire: EncryptedPayload = serde_json::from_slice(&sent.body).unwrap();
    assert_eq!(wire.plain_hash, sha256_base64(INVOICE));
    assert_eq!(wire.offline_flag, Some(false));
    assert_eq!(decrypt_payload(&wire, &session.material).unwrap(), INVOICE);
}

#[tokio::test]
async fn test_keys_fetched_once_per_client() {
    let server = mock_platform().await;
    let client = KsefClient::new(config(&server)).unwrap();

    let token_pem = client.public_key(KeyUsage::KsefTokenEncryption).await.unwrap();
    let a = client.create_session_material().await.unwrap();
    let b = client.create_session_material().await.unwrap();
    assert!(token_pem.starts_with("-----BEGIN CERTIFICATE-----"));
    assert_ne!(a.key(), b.key());
    // mock_platform expects exactly one listing request
}

#[tokio::test]
async fn test_unpublished_usage_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/security/public-key-certificates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "certificate": cert_base64(RSA_CERT),
            "validFrom": "2025-01-01T00:00:00Z",
            "validTo": "2099-01-01T00:00:00Z",
            "usage": ["KsefTokenEncryption"]
        }])))
        .mount(&server)
        .await;

    let client = KsefClient::new(config(&server)).unwrap();
    let err = client.open_session().await.unwrap_err();
    assert!(matches!(err, ClientError::KeyNotFound(KeyUsage::SymmetricKeyEncryption)));
    assert!(!err.is_retryable());
    assert_eq!(client.rate_limiter().active_sessions(), 0);
}

#[tokio::test]
async fn test_listing_outage_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/security/public-key-certificates"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/security/public-key-certificates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "certificate": cert_base64(RSA_CERT),
            "validFrom": "2025-01-01T00:00:00Z",
            "validTo": "2099-01-01T00:00:00Z",
            "usage": ["SymmetricKeyEncryption"]
        }])))
        .mount(&server)
        .await;

    let client = KsefClient::new(config(&server)).unwrap();
    client.create_session_material().await.unwrap();
}

#[tokio::test]
async fn test_unauthorized_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server).with_retries(5, Duration::from_millis(1));
    let client = KsefClient::new(config).unwrap();
    let err = client.public_key(KeyUsage::KsefTokenEncryption).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_session_limit_and_release() {
    let server = mock_platform().await;
    let limits = RateLimitConfig {
        max_concurrent_sessions: 2,
        ..RateLimitConfig::default()
    };
    let client = KsefClient::new(config(&server).with_rate_limits(limits)).unwrap();

    let first = client.open_session().await.unwrap();
    let second = client.open_session().await.unwrap();
    assert!(matches!(
        client.open_session().await,
        Err(ClientError::ConcurrencySessionLimitExceeded { max: 2 })
    ));

    first.permit.release();
    let third = client.open_session().await.unwrap();
    assert_ne!(second.material.key(), third.material.key());
}

#[tokio::test]
async fn test_offline_invoice_verification_links() {
    let config = Config::default().with_verification_base_url("https://qr-test.example.pl");
    let client = KsefClient::new(config).unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();

    let code_one = client.invoice_verification_url("1111111111", date, INVOICE);
    assert!(code_one.starts_with("https://qr-test.example.pl/invoice/1111111111/15-03-2026/"));
    assert!(!code_one.ends_with('='));

    let certificate = OfflineCertificate::from_pem(EC_CERT, EC_SEC1, None).unwrap();
    let code_two = client
        .certificate_verification_url(
            ContextIdentifierType::Nip,
            "1111111111",
            "1111111111",
            INVOICE,
            Some(&certificate),
        )
        .unwrap();
    assert!(code_two.contains("/0123456789ABCDEF/"));
    assert!(verify_certificate_url(&code_two, EC_CERT));
}
