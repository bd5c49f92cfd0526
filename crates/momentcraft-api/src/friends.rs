use axum::{Extension, extract::State, response::IntoResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use momentcraft_db::Database;
use momentcraft_db::models::{FriendRequestOutcome, UserRow};
use momentcraft_types::api::{
    Claims, FriendListResponse, FriendsResponse, MemoryPreview, MessageAck, ProfileResponse,
    ShareTimelineRequest, TimelineResponse, UserSummary,
};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::push::notify_in_background;
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub username: Option<String>,
}

/// GET /all: users the caller has no relationship with yet.
pub async fn all_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.discoverable_users(&uid)).await?;
    Ok(Json(rows.into_iter().map(convert::user_summary).collect::<Vec<_>>()))
}

pub async fn search_user(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let username = query
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("Username is required"))?;

    let user = blocking(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(convert::user_summary(user)))
}

pub async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user_id.to_string();
    let found = blocking(&state, move |db| {
        let Some(user) = db.get_user_by_id(&uid)? else {
            return Ok(None);
        };
        let friends = db.friend_ids(&uid)?;
        let memories_count = db.count_memories_by_user(&uid)?;
        Ok(Some((user, friends, memories_count)))
    })
    .await?;

    let (user, friends, memories_count) =
        found.ok_or_else(|| ApiError::not_found("Friend not found"))?;
    Ok(Json(ProfileResponse {
        id: user_id,
        username: user.username,
        email: user.email,
        friends: friends.iter().map(|f| convert::uuid(f, "friend id")).collect(),
        memories_count,
    }))
}

/// POST /{id}/friends: add directly, without a request.
pub async fn add_friend(
    State(state): State<AppState>,
    Path(friend_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if friend_id == claims.sub {
        return Err(ApiError::bad_request("Cannot add yourself as a friend"));
    }

    let (uid, fid) = (claims.sub.to_string(), friend_id.to_string());
    let friends = blocking(&state, move |db| {
        if db.get_user_by_id(&fid)?.is_none() {
            return Ok(None);
        }
        db.add_friend(&uid, &fid)?;
        Ok(Some(db.friend_ids(&uid)?))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Friend not found"))?;

    Ok(Json(friend_list("Friend added", &friends)))
}

/// DELETE /{id}/friends: unfriend in both directions.
pub async fn remove_friend(
    State(state): State<AppState>,
    Path(friend_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (uid, fid) = (claims.sub.to_string(), friend_id.to_string());
    let friends = blocking(&state, move |db| {
        db.remove_friend(&uid, &fid)?;
        db.friend_ids(&uid)
    })
    .await?;

    Ok(Json(friend_list("Friend removed", &friends)))
}

fn friend_list(message: &str, friends: &[String]) -> FriendListResponse {
    FriendListResponse {
        message: message.to_string(),
        friends: friends.iter().map(|f| convert::uuid(f, "friend id")).collect(),
    }
}

pub async fn send_request(
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if target_id == claims.sub {
        return Err(ApiError::bad_request("Cannot send request to yourself"));
    }

    let (uid, tid) = (claims.sub.to_string(), target_id.to_string());
    let outcome = blocking(&state, move |db| db.send_friend_request(&uid, &tid)).await?;

    match outcome {
        FriendRequestOutcome::Sent => {}
        FriendRequestOutcome::UnknownUser => return Err(ApiError::not_found("User not found")),
        FriendRequestOutcome::AlreadyFriends => {
            return Err(ApiError::bad_request("Already friends"));
        }
        FriendRequestOutcome::AlreadySent => {
            return Err(ApiError::bad_request("Request already sent"));
        }
        FriendRequestOutcome::AlreadyPending => {
            return Err(ApiError::bad_request("Request already pending"));
        }
    }

    info!("{} sent a friend request to {}", claims.sub, target_id);
    notify_in_background(
        &state,
        target_id,
        "New friend request",
        format!("{} wants to be your friend", claims.username),
    );
    Ok(Json(MessageAck::new("Friend request sent")))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(requester_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    answer_request(&state, requester_id, &claims, true).await?;
    notify_in_background(
        &state,
        requester_id,
        "Friend request accepted",
        format!("{} accepted your friend request", claims.username),
    );
    Ok(Json(MessageAck::new("Friend request accepted")))
}

pub async fn decline_request(
    State(state): State<AppState>,
    Path(requester_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    answer_request(&state, requester_id, &claims, false).await?;
    Ok(Json(MessageAck::new("Friend request declined")))
}

async fn answer_request(
    state: &AppState,
    requester_id: Uuid,
    claims: &Claims,
    accept: bool,
) -> Result<(), ApiError> {
    let (rid, uid) = (requester_id.to_string(), claims.sub.to_string());
    let answered = blocking(state, move |db| {
        if db.get_user_by_id(&rid)?.is_none() {
            return Ok(None);
        }
        let done = if accept {
            db.accept_friend_request(&rid, &uid)?
        } else {
            db.decline_friend_request(&rid, &uid)?
        };
        Ok(Some(done))
    })
    .await?;

    match answered {
        None => Err(ApiError::not_found("User not found")),
        Some(false) => Err(ApiError::bad_request("No pending request from this user")),
        Some(true) => Ok(()),
    }
}

pub async fn my_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let (friends, pending, sent) = blocking(&state, move |db| {
        Ok((db.friends_of(&uid)?, db.pending_requests(&uid)?, db.sent_requests(&uid)?))
    })
    .await?;

    let summaries = |rows: Vec<UserRow>| {
        rows.into_iter().map(convert::user_summary).collect::<Vec<UserSummary>>()
    };
    Ok(Json(FriendsResponse {
        friends: summaries(friends),
        pending_requests: summaries(pending),
        sent_requests: summaries(sent),
    }))
}

enum ShareOutcome {
    Shared,
    UnknownTimeline,
    NotOwner,
    NotFriends,
}

pub async fn share_timeline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ShareTimelineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let timeline_id = match req.timeline_id {
        Some(id) if !req.friend_ids.is_empty() => id,
        _ => return Err(ApiError::bad_request("Timeline ID and friend IDs are required")),
    };
    let timeline_id: Uuid = timeline_id
        .trim()
        .parse()
        .map_err(|_| ApiError::not_found("Timeline not found"))?;
    let friend_uuids = req
        .friend_ids
        .iter()
        .map(|f| f.trim().parse::<Uuid>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ApiError::bad_request("Some friend IDs are invalid or not your friends"))?;

    let uid = claims.sub.to_string();
    let tid = timeline_id.to_string();
    let friend_ids: Vec<String> = friend_uuids.iter().map(Uuid::to_string).collect();
    let outcome = blocking(&state, move |db| {
        let Some(timeline) = db.get_timeline(&tid)? else {
            return Ok(ShareOutcome::UnknownTimeline);
        };
        if timeline.user_id != uid {
            return Ok(ShareOutcome::NotOwner);
        }
        let friends = db.friend_ids(&uid)?;
        if friend_ids.iter().any(|f| !friends.contains(f)) {
            return Ok(ShareOutcome::NotFriends);
        }
        db.share_timeline(&tid, &friend_ids)?;
        Ok(ShareOutcome::Shared)
    })
    .await?;

    match outcome {
        ShareOutcome::Shared => {}
        ShareOutcome::UnknownTimeline => return Err(ApiError::not_found("Timeline not found")),
        ShareOutcome::NotOwner => {
            return Err(ApiError::forbidden("Not authorized to share this timeline"));
        }
        ShareOutcome::NotFriends => {
            return Err(ApiError::bad_request("Some friend IDs are invalid or not your friends"));
        }
    }

    for friend in friend_uuids {
        notify_in_background(
            &state,
            friend,
            "Timeline shared",
            format!("{} shared a timeline with you", claims.username),
        );
    }
    Ok(Json(MessageAck::new("Timeline shared with friends successfully")))
}

/// Timelines shared with `target`, each with the memories `viewer` may see.
fn shared_with(
    db: &Database,
    target: &str,
    viewer: &str,
) -> anyhow::Result<Vec<TimelineResponse<MemoryPreview>>> {
    db.shared_timelines_for(target)?
        .into_iter()
        .map(|timeline| {
            let memories = db
                .timeline_memories(&timeline.id, Some(viewer))?
                .into_iter()
                .map(convert::memory_preview)
                .collect();
            Ok(convert::timeline(timeline, memories))
        })
        .collect()
}

pub async fn my_shared_timelines(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let timelines = blocking(&state, move |db| shared_with(db, &uid, &uid)).await?;
    Ok(Json(timelines))
}

/// GET /me/shared-timelines/{friend_id}: what has been shared with a
/// friend. Only the friend themselves or someone in their friends set
/// may look.
pub async fn friend_shared_timelines(
    State(state): State<AppState>,
    Path(friend_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (uid, fid) = (claims.sub.to_string(), friend_id.to_string());
    let timelines = blocking(&state, move |db| {
        if db.get_user_by_id(&fid)?.is_none() {
            return Ok(Err(ApiError::not_found("User not found")));
        }
        if uid != fid && !db.is_friend(&fid, &uid)? {
            return Ok(Err(ApiError::forbidden("Not your friend")));
        }
        Ok(Ok(shared_with(db, &fid, &uid)?))
    })
    .await??;
    Ok(Json(timelines))
}
