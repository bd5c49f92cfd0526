//! Web push delivery: RFC 8291 message encryption (aes128gcm) and RFC 8292
//! VAPID authentication.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand_core::{OsRng, RngCore};
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

/// Record size advertised in the aes128gcm header.
const RECORD_SIZE: u32 = 4096;
/// How long the push service should hold an undelivered message.
const TTL_SECS: u32 = 24 * 60 * 60;
/// VAPID tokens are valid for 12 hours.
const VAPID_EXPIRY_SECS: i64 = 12 * 60 * 60;

/// Uncompressed P-256 point length.
const PUBLIC_KEY_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;

/// A browser push subscription.
#[derive(Debug, Clone)]
pub struct PushSubscriptionInfo {
    pub endpoint: String,
    /// Base64url user agent public key.
    pub p256dh: String,
    /// Base64url authentication secret.
    pub auth: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The push service no longer knows this subscription.
    #[error("subscription expired (HTTP {0})")]
    Gone(u16),
    #[error("push service rejected notification (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Base64url VAPID public key handed to browsers when they subscribe.
    fn public_key(&self) -> &str;

    async fn send(
        &self,
        subscription: &PushSubscriptionInfo,
        payload: &[u8],
    ) -> Result<(), PushError>;
}

/// Application server identity used to sign VAPID tokens.
pub struct VapidKeys {
    signing_key: SigningKey,
    public_key: String,
    subject: String,
}

impl VapidKeys {
    /// `private_key` is the base64url raw 32-byte scalar. When `public_key`
    /// is given it must match the one derived from the private key.
    pub fn from_base64(
        private_key: &str,
        public_key: Option<&str>,
        subject: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let raw = decode_b64url(private_key).context("VAPID private key is not base64url")?;
        let signing_key = SigningKey::from_slice(&raw)
            .map_err(|_| anyhow!("VAPID private key is not a P-256 scalar"))?;
        let derived = B64URL.encode(signing_key.verifying_key().to_encoded_point(false).as_bytes());

        if let Some(configured) = public_key {
            if configured.trim_end_matches('=') != derived {
                anyhow::bail!("VAPID public key does not match the private key");
            }
        }

        Ok(Self {
            signing_key,
            public_key: derived,
            subject: subject.into(),
        })
    }

    /// ES256 JWT for the push service at `audience` (scheme + host).
    fn token(&self, audience: &str) -> String {
        let header = B64URL.encode(json!({ "typ": "JWT", "alg": "ES256" }).to_string());
        let claims = B64URL.encode(
            json!({
                "aud": audience,
                "exp": chrono::Utc::now().timestamp() + VAPID_EXPIRY_SECS,
                "sub": self.subject,
            })
            .to_string(),
        );
        let signing_input = format!("{header}.{claims}");
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        format!("{signing_input}.{}", B64URL.encode(signature.to_bytes()))
    }
}

pub struct WebPushSender {
    http: reqwest::Client,
    vapid: VapidKeys,
}

impl WebPushSender {
    pub fn new(http: reqwest::Client, vapid: VapidKeys) -> Self {
        Self { http, vapid }
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    fn public_key(&self) -> &str {
        &self.vapid.public_key
    }

    async fn send(
        &self,
        subscription: &PushSubscriptionInfo,
        payload: &[u8],
    ) -> Result<(), PushError> {
        let ua_public = decode_b64url(&subscription.p256dh)
            .map_err(|_| PushError::InvalidSubscription("p256dh is not base64url".into()))?;
        let auth_secret = decode_b64url(&subscription.auth)
            .map_err(|_| PushError::InvalidSubscription("auth is not base64url".into()))?;
        let body = encrypt(payload, &ua_public, &auth_secret)?;

        let endpoint = reqwest::Url::parse(&subscription.endpoint)
            .map_err(|e| PushError::InvalidSubscription(format!("endpoint: {e}")))?;
        let audience = endpoint.origin().ascii_serialization();

        let response = self
            .http
            .post(endpoint)
            .header("TTL", TTL_SECS.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header(
                "Authorization",
                format!("vapid t={}, k={}", self.vapid.token(&audience), self.vapid.public_key),
            )
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {
                debug!("Push delivered to {}", subscription.endpoint);
                Ok(())
            }
            404 | 410 => Err(PushError::Gone(status)),
            _ => Err(PushError::Rejected {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Encrypt `payload` for a user agent as a single aes128gcm record.
///
/// Output layout: salt (16) | record size (4, BE) | key id length (1) |
/// sender public key (65) | ciphertext.
pub fn encrypt(payload: &[u8], ua_public: &[u8], auth_secret: &[u8]) -> Result<Vec<u8>, PushError> {
    if ua_public.len() != PUBLIC_KEY_LEN {
        return Err(PushError::InvalidSubscription(
            "p256dh must be an uncompressed P-256 point".into(),
        ));
    }
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(PushError::InvalidSubscription("auth secret must be 16 bytes".into()));
    }
    // One record holds the payload, the delimiter and the 16-byte tag.
    if payload.len() + 1 + 16 > RECORD_SIZE as usize {
        return Err(PushError::Encryption("payload too large for a single record".into()));
    }

    let ua_key = PublicKey::from_sec1_bytes(ua_public)
        .map_err(|_| PushError::InvalidSubscription("p256dh is not a valid P-256 point".into()))?;

    let as_secret = EphemeralSecret::random(&mut OsRng);
    let as_public = as_secret.public_key().to_encoded_point(false);
    let shared = as_secret.diffie_hellman(&ua_key);

    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);

    let (cek, nonce) = derive_content_keys(
        shared.raw_secret_bytes().as_slice(),
        auth_secret,
        ua_public,
        as_public.as_bytes(),
        &salt,
    )?;

    let mut plaintext = Vec::with_capacity(payload.len() + 1);
    plaintext.extend_from_slice(payload);
    plaintext.push(0x02); // last-record delimiter

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|e| PushError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|e| PushError::Encryption(e.to_string()))?;

    let mut body = Vec::with_capacity(16 + 4 + 1 + PUBLIC_KEY_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(as_public.as_bytes());
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// RFC 8291 section 3.4 key schedule: returns (content encryption key, nonce).
fn derive_content_keys(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<([u8; 16], [u8; 12]), PushError> {
    let mut key_info = Vec::with_capacity(14 + 2 * PUBLIC_KEY_LEN);
    key_info.extend_from_slice(b"WebPush: info\0");
    key_info.extend_from_slice(ua_public);
    key_info.extend_from_slice(as_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|e| PushError::Encryption(e.to_string()))?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut cek = [0u8; 16];
    let mut nonce = [0u8; 12];
    prk.expand(b"Content-Encoding: aes128gcm\0", &mut cek)
        .map_err(|e| PushError::Encryption(e.to_string()))?;
    prk.expand(b"Content-Encoding: nonce\0", &mut nonce)
        .map_err(|e| PushError::Encryption(e.to_string()))?;
    Ok((cek, nonce))
}

fn decode_b64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    B64URL.decode(value.trim().trim_end_matches('='))
}
