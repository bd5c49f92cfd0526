use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::info;

use momentcraft_types::models::MediaKind;

use crate::host::{MediaHost, StoredMedia};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DELIVERY_BASE: &str = "https://res.cloudinary.com";

/// Incoming transformation applied to uploaded photos.
const IMAGE_TRANSFORMATION: &str = "q_auto:good/e_improve";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Cloudinary upload API client (signed uploads, no SDK).
pub struct CloudinaryHost {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryHost {
    pub fn new(http: reqwest::Client, config: CloudinaryConfig) -> Self {
        info!("Cloudinary media host for cloud '{}'", config.cloud_name);
        Self { http, config }
    }

    fn endpoint(&self, kind: MediaKind, action: &str) -> String {
        format!("{}/{}/{}/{}", API_BASE, self.config.cloud_name, kind.resource_type(), action)
    }

    /// Signed parameter set: the given params plus `timestamp`, `api_key`
    /// and `signature`.
    fn signed(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        params.push(("timestamp", chrono::Utc::now().timestamp().to_string()));
        let signature = sign(&params, &self.config.api_secret);
        params.push(("api_key", self.config.api_key.clone()));
        params.push(("signature", signature));
        params
    }
}

#[async_trait]
impl MediaHost for CloudinaryHost {
    async fn upload(
        &self,
        data: Vec<u8>,
        public_id: &str,
        file_name: &str,
        kind: MediaKind,
    ) -> Result<StoredMedia> {
        let mut params = vec![("public_id", public_id.to_string())];
        if kind == MediaKind::Image {
            params.push(("transformation", IMAGE_TRANSFORMATION.to_string()));
        }

        let mut form = Form::new().part("file", Part::bytes(data).file_name(file_name.to_string()));
        for (key, value) in self.signed(params) {
            form = form.text(key, value);
        }

        let response = self
            .http
            .post(self.endpoint(kind, "upload"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Cloudinary upload failed ({}): {}", status, body);
        }

        let uploaded: UploadResponse = response.json().await?;
        info!("Uploaded {} to {}", kind.resource_type(), uploaded.secure_url);
        Ok(StoredMedia {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn destroy(&self, public_id: &str, kind: MediaKind) -> Result<()> {
        let params = self.signed(vec![("public_id", public_id.to_string())]);
        let response = self
            .http
            .post(self.endpoint(kind, "destroy"))
            .form(&params)
            .send()
            .await?
            .error_for_status()?;

        let destroyed: DestroyResponse = response.json().await?;
        if destroyed.result != "ok" {
            bail!("Cloudinary destroy of {} returned '{}'", public_id, destroyed.result);
        }
        Ok(())
    }

    fn thumbnail_url(&self, public_id: &str, offset_secs: u32) -> Option<String> {
        Some(format!(
            "{}/{}/video/upload/c_fill,h_300,w_300/f_jpg,q_auto/so_{}/{}.jpg",
            DELIVERY_BASE, self.config.cloud_name, offset_secs, public_id
        ))
    }
}

/// Request signature: SHA-1 over the params sorted by name, joined as
/// `k=v&k=v`, followed by the API secret.
fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
