use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::warn;

use momentcraft_media::cloudinary::CloudinaryConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your_jwt_secret",
];

const DEFAULT_VAPID_SUBJECT: &str = "mailto:support@momentcraft.com";

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub subject: String,
    pub public_key: Option<String>,
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// Base URL clients use to reach this server; prefixes local media URLs.
    pub public_url: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cloudinary: Option<CloudinaryConfig>,
    pub hugging_face_key: Option<String>,
    pub openai_key: Option<String>,
    pub vapid: Option<VapidConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("MOMENTCRAFT_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MOMENTCRAFT_JWT_SECRET is unset or still a placeholder");
        }

        let port: u16 = match get("MOMENTCRAFT_PORT") {
            Some(v) => v.parse().with_context(|| format!("MOMENTCRAFT_PORT '{v}' is not a port"))?,
            None => 5000,
        };
        let token_ttl_hours: i64 = match get("MOMENTCRAFT_TOKEN_TTL_HOURS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("MOMENTCRAFT_TOKEN_TTL_HOURS '{v}' is not a number"))?,
            None => 1,
        };
        if token_ttl_hours <= 0 {
            bail!("MOMENTCRAFT_TOKEN_TTL_HOURS must be positive");
        }
        let max_upload_mb: usize = match get("MOMENTCRAFT_MAX_UPLOAD_MB") {
            Some(v) => v
                .parse()
                .with_context(|| format!("MOMENTCRAFT_MAX_UPLOAD_MB '{v}' is not a number"))?,
            None => 100,
        };
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("MOMENTCRAFT_MAX_UPLOAD_MB {max_upload_mb} is too large"))?;

        let cloudinary = match (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            (None, None, None) => None,
            _ => {
                warn!("Cloudinary is partially configured; falling back to local media storage");
                None
            }
        };

        let vapid = match (get("VAPID_PRIVATE_KEY"), get("VAPID_PUBLIC_KEY")) {
            (Some(private_key), public_key) => Some(VapidConfig {
                subject: get("VAPID_SUBJECT").unwrap_or_else(|| DEFAULT_VAPID_SUBJECT.to_string()),
                public_key,
                private_key,
            }),
            (None, Some(_)) => {
                warn!(
                    "VAPID_PUBLIC_KEY set without VAPID_PRIVATE_KEY; push notifications disabled"
                );
                None
            }
            (None, None) => None,
        };

        Ok(Self {
            host: get("MOMENTCRAFT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            public_url: get("MOMENTCRAFT_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            port,
            db_path: get("MOMENTCRAFT_DB_PATH").unwrap_or_else(|| "momentcraft.db".into()).into(),
            jwt_secret,
            token_ttl_hours,
            upload_dir: get("MOMENTCRAFT_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            max_upload_bytes,
            cloudinary,
            hugging_face_key: get("HUGGING_FACE_API_KEY"),
            openai_key: get("OPENAI_API_KEY"),
            vapid,
        })
    }
}
