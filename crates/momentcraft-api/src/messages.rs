use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use momentcraft_types::api::{Claims, MessageAck, SendMessageRequest};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::state::{AppState, blocking};

const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: pass the `created_at` timestamp of the
    /// oldest message from the previous page to fetch older messages.
    pub before: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    50
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(recipient_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("Message content is required"));
    }

    let message_id = Uuid::new_v4().to_string();
    let (sid, rid) = (claims.sub.to_string(), recipient_id.to_string());
    let sent = blocking(&state, move |db| {
        if db.get_user_by_id(&rid)?.is_none() {
            return Ok(false);
        }
        db.insert_message(&message_id, &sid, &rid, &req.content)?;
        Ok(true)
    })
    .await?;

    if !sent {
        return Err(ApiError::not_found("Recipient not found"));
    }
    Ok((StatusCode::CREATED, Json(MessageAck::new("Message sent"))))
}

/// GET /{user_id}: the conversation between the caller and another user,
/// newest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(other_id): Path<Uuid>,
    Query(query): Query<ConversationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (uid, oid) = (claims.sub.to_string(), other_id.to_string());
    let limit = query.limit.clamp(1, MAX_PAGE);
    let before = query.before;

    let rows = blocking(&state, move |db| db.get_conversation(&uid, &oid, limit, before)).await?;
    Ok(Json(rows.into_iter().map(convert::direct_message).collect::<Vec<_>>()))
}
