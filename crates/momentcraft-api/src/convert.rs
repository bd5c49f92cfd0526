//! Row-to-response conversions. Stored ids and timestamps are trusted; a
//! corrupt value is logged and replaced with a default rather than failing
//! the whole listing.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use momentcraft_db::models::{MemoryRow, MessageRow, TimelineRow, UserRow};
use momentcraft_types::api::{
    DirectMessage, MemoryPreview, MemoryResponse, TimelineResponse, UserSummary,
};
use momentcraft_types::models::{Location, Visibility};

pub fn uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn timestamp(raw: &str, what: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {}: {}", raw, what, e);
            DateTime::default()
        })
}

pub fn user_summary(row: UserRow) -> UserSummary {
    UserSummary {
        id: uuid(&row.id, "user id"),
        username: row.username,
        email: row.email,
    }
}

pub fn memory(row: MemoryRow) -> MemoryResponse {
    let visibility = row.visibility.parse().unwrap_or_else(|e| {
        warn!("Memory '{}' has {}", row.id, e);
        Visibility::Private
    });
    let location = match (row.lat, row.lng) {
        (Some(lat), Some(lng)) => Some(Location { lat, lng }),
        _ => None,
    };

    MemoryResponse {
        id: uuid(&row.id, "memory id"),
        user_id: uuid(&row.user_id, "memory owner"),
        created_at: timestamp(&row.created_at, &format!("memory '{}'", row.id)),
        title: row.title,
        description: row.description,
        media: row.media_url,
        is_video: row.is_video,
        caption: row.caption,
        summary: row.summary,
        username: row.username,
        visibility,
        location,
        model_url: row.model_url,
    }
}

pub fn memory_preview(row: MemoryRow) -> MemoryPreview {
    MemoryPreview {
        id: uuid(&row.id, "memory id"),
        title: row.title,
        media: row.media_url,
        caption: row.caption,
    }
}

pub fn timeline<M>(row: TimelineRow, memories: Vec<M>) -> TimelineResponse<M> {
    TimelineResponse {
        id: uuid(&row.id, "timeline id"),
        user_id: uuid(&row.user_id, "timeline owner"),
        created_at: timestamp(&row.created_at, &format!("timeline '{}'", row.id)),
        name: row.name,
        description: row.description,
        username: row.username,
        memories,
    }
}

pub fn direct_message(row: MessageRow) -> DirectMessage {
    DirectMessage {
        id: uuid(&row.id, "message id"),
        sender_id: uuid(&row.sender_id, "message sender"),
        recipient_id: uuid(&row.recipient_id, "message recipient"),
        created_at: timestamp(&row.created_at, &format!("message '{}'", row.id)),
        content: row.content,
    }
}
