use std::sync::Arc;

use axum::{Extension, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use futures_util::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use momentcraft_media::push::{PushError, PushSender, PushSubscriptionInfo};
use momentcraft_types::api::{
    Claims, MessageAck, NotificationPayload, NotifyRequest, NotifyResponse, NotifyResult,
    SubscribeRequest, UnsubscribeRequest, VapidKeyResponse,
};

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::{AppState, blocking};

pub const DEFAULT_TITLE: &str = "MomentCraft Update";
pub const DEFAULT_BODY: &str = "New content is available!";

fn sender(state: &AppState) -> Option<Arc<dyn PushSender>> {
    state.push.clone()
}

pub async fn vapid_public_key(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let sender =
        sender(&state).ok_or_else(|| ApiError::not_found("Push notifications are not configured"))?;
    Ok(Json(VapidKeyResponse {
        public_key: sender.public_key().to_string(),
    }))
}

pub async fn subscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::bad_request("Invalid subscription data");
    let subscription = req.subscription.ok_or_else(invalid)?;
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let endpoint = non_empty(subscription.endpoint).ok_or_else(invalid)?;
    let p256dh = non_empty(subscription.keys.p256dh).ok_or_else(invalid)?;
    let auth = non_empty(subscription.keys.auth).ok_or_else(invalid)?;

    let id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();
    blocking(&state, move |db| db.upsert_subscription(&id, &uid, &endpoint, &p256dh, &auth)).await?;

    info!("Saved push subscription for {}", claims.sub);
    Ok((StatusCode::CREATED, Json(MessageAck::new("Subscription saved"))))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let removed = blocking(&state, move |db| db.delete_subscription(&uid, &req.endpoint)).await?;
    if !removed {
        return Err(ApiError::not_found("Subscription not found"));
    }
    Ok(Json(MessageAck::new("Subscription removed")))
}

/// POST /notify/{user_id}: push a notification to every device of a user.
pub async fn notify(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: NotifyRequest = if body.is_empty() {
        NotifyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {e}")))?
    };
    let sender = sender(&state)
        .ok_or_else(|| ApiError::Unavailable("Push notifications are not configured".into()))?;

    let payload = NotificationPayload {
        title: req.title.filter(|t| !t.is_empty()).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        body: req.body.filter(|b| !b.is_empty()).unwrap_or_else(|| DEFAULT_BODY.to_string()),
    };

    let results = deliver(&state, sender.as_ref(), &user_id.to_string(), &payload).await?;
    if results.is_empty() {
        return Err(ApiError::not_found("No subscriptions found for user"));
    }

    Ok(Json(NotifyResponse {
        message: "Notifications processed".into(),
        results,
    }))
}

/// Send `payload` to all of a user's subscriptions concurrently. Expired
/// subscriptions are deleted. Returns one result per subscription.
pub async fn deliver(
    state: &AppState,
    sender: &dyn PushSender,
    user_id: &str,
    payload: &NotificationPayload,
) -> Result<Vec<NotifyResult>, ApiError> {
    let uid = user_id.to_string();
    let subscriptions = blocking(state, move |db| db.subscriptions_for_user(&uid)).await?;
    if subscriptions.is_empty() {
        return Ok(Vec::new());
    }

    let body = serde_json::to_vec(payload).map_err(anyhow::Error::from)?;
    let outcomes = join_all(subscriptions.iter().map(|row| {
        let info = PushSubscriptionInfo {
            endpoint: row.endpoint.clone(),
            p256dh: row.p256dh.clone(),
            auth: row.auth.clone(),
        };
        let body = &body;
        async move { sender.send(&info, body).await }
    }))
    .await;

    let mut results = Vec::with_capacity(outcomes.len());
    let mut expired = Vec::new();
    for (row, outcome) in subscriptions.into_iter().zip(outcomes) {
        match outcome {
            Ok(()) => results.push(NotifyResult {
                endpoint: row.endpoint,
                status: "success".into(),
                error: None,
            }),
            Err(e) => {
                warn!("Failed to send notification to {}: {}", row.endpoint, e);
                if matches!(e, PushError::Gone(_)) {
                    expired.push(row.id);
                }
                results.push(NotifyResult {
                    endpoint: row.endpoint,
                    status: "failed".into(),
                    error: Some(e.to_string()),
                });
            }
        }
    }

    if !expired.is_empty() {
        debug!("Pruning {} expired push subscriptions", expired.len());
        blocking(state, move |db| {
            for id in &expired {
                db.delete_subscription_by_id(id)?;
            }
            Ok(())
        })
        .await?;
    }

    Ok(results)
}

/// Fire-and-forget notification for social events. No-op when push is
/// not configured.
pub fn notify_in_background(state: &AppState, user_id: Uuid, title: &str, body: String) {
    let Some(sender) = sender(state) else {
        return;
    };
    let state = state.clone();
    let payload = NotificationPayload {
        title: title.to_string(),
        body,
    };
    tokio::spawn(async move {
        if let Err(e) = deliver(&state, sender.as_ref(), &user_id.to_string(), &payload).await {
            warn!("Background notification to {} failed: {}", user_id, e);
        }
    });
}
