use anyhow::Result;
use async_trait::async_trait;

use momentcraft_types::models::MediaKind;

use crate::caption::{MediaSource, THUMBNAIL_OFFSETS_SECS};

/// Media as stored by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    /// Canonical URL clients load the media from.
    pub url: String,
    /// Host-side key, needed to delete or derive thumbnails.
    pub public_id: String,
}

/// Remote (or local) storage for uploaded photos and videos.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Store `data` under `public_id`. `file_name` is the client-supplied
    /// name and only serves as a hint for the stored format.
    async fn upload(
        &self,
        data: Vec<u8>,
        public_id: &str,
        file_name: &str,
        kind: MediaKind,
    ) -> Result<StoredMedia>;

    async fn destroy(&self, public_id: &str, kind: MediaKind) -> Result<()>;

    /// A still frame of a stored video at `offset_secs`, when the host can
    /// render one.
    fn thumbnail_url(&self, public_id: &str, offset_secs: u32) -> Option<String>;

    /// Where the captioner reads that frame from. Hosts that hold frames
    /// in memory can hand out bytes instead of a URL.
    fn thumbnail(&self, public_id: &str, offset_secs: u32) -> Option<MediaSource> {
        self.thumbnail_url(public_id, offset_secs).map(MediaSource::Url)
    }
}

/// Thumbnails of a stored video at the standard caption offsets.
pub fn video_thumbnails(host: &dyn MediaHost, public_id: &str) -> Vec<MediaSource> {
    THUMBNAIL_OFFSETS_SECS
        .iter()
        .filter_map(|offset| host.thumbnail(public_id, *offset))
        .collect()
}
