use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Location, Visibility};

// -- JWT Claims --

/// JWT claims issued at login/registration and checked by the REST
/// middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Generic --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageAck {
    pub message: String,
}

impl MessageAck {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// -- Auth --

/// Missing fields deserialize as empty and fail validation in the handler.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Users & friends --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendsResponse {
    pub friends: Vec<UserSummary>,
    pub pending_requests: Vec<UserSummary>,
    pub sent_requests: Vec<UserSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendListResponse {
    pub message: String,
    pub friends: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub friends: Vec<Uuid>,
    pub memories_count: u64,
}

/// Ids stay as strings so malformed ones can be reported like unknown ones.
#[derive(Debug, Deserialize)]
pub struct ShareTimelineRequest {
    #[serde(alias = "timelineId")]
    pub timeline_id: Option<String>,
    #[serde(default, alias = "friendIds")]
    pub friend_ids: Vec<String>,
}

// -- Memories --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub media: String,
    pub is_video: bool,
    pub caption: Option<String>,
    pub summary: Option<String>,
    pub user_id: Uuid,
    pub username: String,
    pub visibility: Visibility,
    pub location: Option<Location>,
    pub model_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reduced memory shape embedded in timeline listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPreview {
    pub id: Uuid,
    pub title: String,
    pub media: String,
    pub caption: Option<String>,
}

// -- Timelines --

#[derive(Debug, Deserialize)]
pub struct CreateTimelineRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    #[serde(alias = "memoryIds")]
    pub memory_ids: Vec<Uuid>,
}

/// Timeline with its memories in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineResponse<M> {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub memories: Vec<M>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// -- Push --

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionPayload {
    pub endpoint: Option<String>,
    #[serde(default)]
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub subscription: Option<SubscriptionPayload>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotifyRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResult {
    pub endpoint: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub message: String,
    pub results: Vec<NotifyResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VapidKeyResponse {
    pub public_key: String,
}
