use std::collections::HashSet;

use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use momentcraft_db::Database;
use momentcraft_db::models::TimelineRow;
use momentcraft_types::api::{
    Claims, CreateTimelineRequest, MemoryPreview, MessageAck, ReorderRequest, TimelineResponse,
};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::{AppState, blocking};

/// Timeline with previews of the members `viewer` may read.
fn preview(
    db: &Database,
    timeline: TimelineRow,
    viewer: Option<&str>,
) -> anyhow::Result<TimelineResponse<MemoryPreview>> {
    let memories = db
        .timeline_memories(&timeline.id, viewer)?
        .into_iter()
        .map(convert::memory_preview)
        .collect();
    Ok(convert::timeline(timeline, memories))
}

/// Fetch a timeline and check the caller owns it.
fn owned(
    db: &Database,
    timeline_id: &str,
    user_id: &str,
) -> anyhow::Result<Result<TimelineRow, ApiError>> {
    Ok(match db.get_timeline(timeline_id)? {
        None => Err(ApiError::not_found("Timeline not found")),
        Some(t) if t.user_id != user_id => {
            Err(ApiError::forbidden("Not authorized to modify this timeline"))
        }
        Some(t) => Ok(t),
    })
}

pub async fn create_timeline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTimelineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let (Some(name), Some(description)) = (non_empty(req.name), non_empty(req.description)) else {
        return Err(ApiError::bad_request("Name and description are required."));
    };

    let id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();
    let timeline = blocking(&state, move |db| {
        db.insert_timeline(&id, &uid, &name, Some(&description))?;
        let row = db
            .get_timeline(&id)?
            .ok_or_else(|| anyhow::anyhow!("timeline {id} vanished after insert"))?;
        Ok(convert::timeline(row, Vec::<MemoryPreview>::new()))
    })
    .await?;

    info!("{} created timeline {}", claims.sub, timeline.id);
    Ok((StatusCode::CREATED, Json(timeline)))
}

/// GET /: the caller's own timelines.
pub async fn list_timelines(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let timelines = blocking(&state, move |db| {
        db.timelines_for_user(&uid)?
            .into_iter()
            .map(|t| preview(db, t, Some(&uid)))
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;
    Ok(Json(timelines))
}

/// GET /{id}: full memories, for the owner or anyone it was shared with.
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (tid, uid) = (timeline_id.to_string(), claims.sub.to_string());
    let timeline = blocking(&state, move |db| {
        let Some(timeline) = db.get_timeline(&tid)? else {
            return Ok(Err(ApiError::not_found("Timeline not found")));
        };
        if timeline.user_id != uid && !db.is_timeline_shared_with(&tid, &uid)? {
            return Ok(Err(ApiError::forbidden("Not authorized to view this timeline")));
        }
        let memories = db
            .timeline_memories(&tid, Some(&uid))?
            .into_iter()
            .map(convert::memory)
            .collect();
        Ok(Ok(convert::timeline(timeline, memories)))
    })
    .await??;
    Ok(Json(timeline))
}

/// GET /public/{id}: anyone may look, but only public memories are listed.
pub async fn public_timeline(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tid = timeline_id.to_string();
    let timeline = blocking(&state, move |db| match db.get_timeline(&tid)? {
        Some(t) => Ok(Some(preview(db, t, None)?)),
        None => Ok(None),
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Timeline not found"))?;
    Ok(Json(timeline))
}

pub async fn add_memory(
    State(state): State<AppState>,
    Path((timeline_id, memory_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (tid, mid, uid) = (timeline_id.to_string(), memory_id.to_string(), claims.sub.to_string());
    let timeline = blocking(&state, move |db| {
        let timeline = match owned(db, &tid, &uid)? {
            Ok(t) => t,
            Err(e) => return Ok(Err(e)),
        };
        // Hidden memories are reported the same as missing ones.
        if !db.memory_visible_to(&mid, Some(&uid))? {
            return Ok(Err(ApiError::not_found("Memory not found")));
        }
        db.add_memory_to_timeline(&tid, &mid)?;
        Ok(Ok(preview(db, timeline, Some(&uid))?))
    })
    .await??;
    Ok(Json(timeline))
}

pub async fn remove_memory(
    State(state): State<AppState>,
    Path((timeline_id, memory_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (tid, mid, uid) = (timeline_id.to_string(), memory_id.to_string(), claims.sub.to_string());
    let timeline = blocking(&state, move |db| {
        let timeline = match owned(db, &tid, &uid)? {
            Ok(t) => t,
            Err(e) => return Ok(Err(e)),
        };
        db.remove_memory_from_timeline(&tid, &mid)?;
        Ok(Ok(preview(db, timeline, Some(&uid))?))
    })
    .await??;
    Ok(Json(timeline))
}

/// PUT /{id}/reorder: the new order may drop members but not add any.
pub async fn reorder(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut seen = HashSet::new();
    if !req.memory_ids.iter().all(|id| seen.insert(*id)) {
        return Err(ApiError::bad_request("Duplicate memory ids in new order"));
    }

    let (tid, uid) = (timeline_id.to_string(), claims.sub.to_string());
    let order: Vec<String> = req.memory_ids.iter().map(Uuid::to_string).collect();
    let timeline = blocking(&state, move |db| {
        let timeline = match owned(db, &tid, &uid)? {
            Ok(t) => t,
            Err(e) => return Ok(Err(e)),
        };
        let members = db.timeline_memory_ids(&tid)?;
        if order.iter().any(|id| !members.contains(id)) {
            return Ok(Err(ApiError::bad_request(
                "Only memories already in the timeline can be reordered",
            )));
        }
        db.set_timeline_order(&tid, &order)?;
        Ok(Ok(preview(db, timeline, Some(&uid))?))
    })
    .await??;
    Ok(Json(timeline))
}

pub async fn delete_timeline(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (tid, uid) = (timeline_id.to_string(), claims.sub.to_string());
    blocking(&state, move |db| {
        if let Err(e) = owned(db, &tid, &uid)? {
            return Ok(Err(e));
        }
        db.delete_timeline(&tid)?;
        Ok(Ok(()))
    })
    .await??;

    info!("{} deleted timeline {}", claims.sub, timeline_id);
    Ok(Json(MessageAck::new("Timeline deleted successfully")))
}
