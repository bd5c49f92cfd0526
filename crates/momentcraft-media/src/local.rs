use anyhow::{Result, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use momentcraft_types::models::MediaKind;

use crate::host::{MediaHost, StoredMedia};

/// Development media host: keeps uploads on local disk.
///
/// Each upload is a flat file at `{dir}/{name}`, served by the HTTP layer
/// under `{public_base_url}/uploads/`. Cannot render video thumbnails.
pub struct LocalMediaStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalMediaStore {
    pub async fn new(dir: PathBuf, public_base_url: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Local media directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("Invalid media file name: {}", name);
        }
        Ok(self.dir.join(name))
    }
}

/// Flatten `memories/<id>` plus the upload's extension into a file name.
fn stored_name(public_id: &str, file_name: &str) -> String {
    let base: String = public_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
        Some(ext) => format!("{}.{}", base, ext.to_ascii_lowercase()),
        None => base,
    }
}

#[async_trait]
impl MediaHost for LocalMediaStore {
    async fn upload(
        &self,
        data: Vec<u8>,
        public_id: &str,
        file_name: &str,
        _kind: MediaKind,
    ) -> Result<StoredMedia> {
        let name = stored_name(public_id, file_name);
        let path = self.file_path(&name)?;
        fs::write(&path, &data).await?;

        Ok(StoredMedia {
            url: format!("{}/uploads/{}", self.public_base_url, name),
            public_id: name,
        })
    }

    async fn destroy(&self, public_id: &str, _kind: MediaKind) -> Result<()> {
        let path = self.file_path(public_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted local media {}", public_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Local media {} already gone", public_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn thumbnail_url(&self, _public_id: &str, _offset_secs: u32) -> Option<String> {
        None
    }
}
