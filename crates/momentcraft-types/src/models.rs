use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Who may read a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Friends,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Friends => "friends",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid visibility value. Must be private, friends, or public.")]
pub struct ParseVisibilityError;

impl FromStr for Visibility {
    type Err = ParseVisibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "friends" => Ok(Self::Friends),
            "public" => Ok(Self::Public),
            _ => Err(ParseVisibilityError),
        }
    }
}

/// Kind of media attached to a memory. Decides how the media host stores it
/// and which caption path runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Video container types accepted for upload.
const VIDEO_MIME_TYPES: &[&str] = &["video/mp4", "video/webm", "video/ogg"];

impl MediaKind {
    /// Classify an upload by its MIME type. Anything that is neither a
    /// supported video nor an image is rejected.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if VIDEO_MIME_TYPES.contains(&mime.as_str()) {
            Some(Self::Video)
        } else if mime.starts_with("image/") {
            Some(Self::Image)
        } else {
            None
        }
    }

    pub fn from_is_video(is_video: bool) -> Self {
        if is_video { Self::Video } else { Self::Image }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    /// Resource segment used by the media host URLs.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}
