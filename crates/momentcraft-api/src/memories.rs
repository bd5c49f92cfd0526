use axum::{
    Extension,
    extract::{Multipart, State, multipart::{MultipartError, MultipartRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use momentcraft_db::models::{MemoryRow, NewMemory};
use momentcraft_media::caption::MediaSource;
use momentcraft_media::host::{StoredMedia, video_thumbnails};
use momentcraft_types::api::{Claims, MessageAck};
use momentcraft_types::models::{Location, MediaKind, Visibility};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::{AppState, blocking};

/// An uploaded media part.
struct Upload {
    data: Vec<u8>,
    file_name: String,
    kind: MediaKind,
}

/// Multipart body shared by create and edit. Every field is optional here;
/// create enforces its own requirements.
#[derive(Default)]
struct MemoryForm {
    media: Option<Upload>,
    title: Option<String>,
    description: Option<String>,
    visibility: Option<Visibility>,
    lat: Option<f64>,
    lng: Option<f64>,
    model_url: Option<String>,
}

impl MemoryForm {
    fn location(&self) -> Result<Option<Location>, ApiError> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Ok(Some(Location { lat, lng })),
            (None, None) => Ok(None),
            _ => Err(ApiError::bad_request("Both lat and lng are required for a location")),
        }
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::bad_request(e.body_text())
}

async fn read_form(mut multipart: Multipart) -> Result<MemoryForm, ApiError> {
    let mut form = MemoryForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "media" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let mime = field.content_type().unwrap_or_default().to_string();
            let kind = MediaKind::from_mime(&mime).ok_or_else(|| {
                ApiError::bad_request("Only image and video uploads are supported")
            })?;
            let data = field.bytes().await.map_err(multipart_error)?.to_vec();
            if data.is_empty() {
                return Err(ApiError::bad_request("Uploaded file is empty"));
            }
            debug!("Received {} upload '{}' ({} bytes)", mime, file_name, data.len());
            form.media = Some(Upload { data, file_name, kind });
            continue;
        }

        let text = field.text().await.map_err(multipart_error)?;
        let value = Some(text.trim().to_string()).filter(|v| !v.is_empty());
        match name.as_str() {
            "title" => form.title = value,
            "description" => form.description = value,
            "model_url" | "modelUrl" => form.model_url = value,
            "visibility" => {
                form.visibility = value
                    .map(|v| v.parse::<Visibility>())
                    .transpose()
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
            }
            "lat" => form.lat = parse_coordinate(value, "lat")?,
            "lng" => form.lng = parse_coordinate(value, "lng")?,
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    Ok(form)
}

fn parse_coordinate(value: Option<String>, name: &str) -> Result<Option<f64>, ApiError> {
    value
        .map(|v| v.parse::<f64>())
        .transpose()
        .map_err(|_| ApiError::bad_request(format!("Invalid {name}")))
}

/// Upload the media and caption it. Images are captioned from the uploaded
/// bytes, videos from host-rendered thumbnails.
async fn store_and_caption(
    state: &AppState,
    upload: Upload,
    public_id: &str,
) -> Result<(StoredMedia, String, Option<String>), ApiError> {
    let Upload { data, file_name, kind } = upload;
    let image = (!kind.is_video()).then(|| data.clone());

    let stored = state.media.upload(data, public_id, &file_name, kind).await?;
    info!("Stored {} as {}", file_name, stored.url);

    match image {
        Some(bytes) => {
            let caption = state.captioner.caption(&MediaSource::Bytes(bytes)).await;
            Ok((stored, caption, None))
        }
        None => {
            let thumbnails = video_thumbnails(state.media.as_ref(), &stored.public_id);
            let captions = state.captioner.caption_video(&thumbnails).await;
            Ok((stored, captions.caption, Some(captions.summary)))
        }
    }
}

/// Best-effort delete of hosted media; failures are only logged.
async fn discard_media(state: &AppState, public_id: &str, is_video: bool) {
    if let Err(e) = state.media.destroy(public_id, MediaKind::from_is_video(is_video)).await {
        warn!("Failed to delete media {}: {:#}", public_id, e);
    }
}

async fn load_memory(state: &AppState, memory_id: Uuid) -> Result<MemoryRow, ApiError> {
    let mid = memory_id.to_string();
    blocking(state, move |db| db.get_memory(&mid))
        .await?
        .ok_or_else(|| ApiError::not_found("Memory not found"))
}

/// Load a memory the caller is about to change.
async fn load_owned(
    state: &AppState,
    memory_id: Uuid,
    claims: &Claims,
) -> Result<MemoryRow, ApiError> {
    let memory = load_memory(state, memory_id).await?;
    if memory.user_id != claims.sub.to_string() {
        return Err(ApiError::forbidden("Not authorized to modify this memory"));
    }
    Ok(memory)
}

async fn reload(state: &AppState, memory_id: String) -> Result<MemoryRow, ApiError> {
    blocking(state, move |db| db.get_memory(&memory_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Memory not found"))
}

pub async fn create_memory(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_form(multipart?).await?;
    let location = form.location()?;
    let title = form.title.take().ok_or_else(|| ApiError::bad_request("Title is required"))?;
    let upload = form.media.take().ok_or_else(|| ApiError::bad_request("Media file is required"))?;
    let is_video = upload.kind.is_video();

    let memory_id = Uuid::new_v4().to_string();
    let (stored, caption, summary) =
        store_and_caption(&state, upload, &format!("memories/{memory_id}")).await?;

    let mid = memory_id.clone();
    let uid = claims.sub.to_string();
    let visibility = form.visibility.unwrap_or_default();
    blocking(&state, move |db| {
        db.insert_memory(&NewMemory {
            id: &mid,
            user_id: &uid,
            title: &title,
            description: form.description.as_deref(),
            media_url: &stored.url,
            media_public_id: &stored.public_id,
            is_video,
            caption: Some(&caption),
            summary: summary.as_deref(),
            visibility: visibility.as_str(),
            lat: location.map(|l| l.lat),
            lng: location.map(|l| l.lng),
            model_url: form.model_url.as_deref(),
        })
    })
    .await?;

    info!("{} created memory {}", claims.sub, memory_id);
    let row = reload(&state, memory_id).await?;
    Ok((StatusCode::CREATED, Json(convert::memory(row))))
}

pub async fn edit_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_form(multipart?).await?;
    let location = form.location()?;
    let mut memory = load_owned(&state, memory_id, &claims).await?;

    if let Some(title) = form.title.take() {
        memory.title = title;
    }
    if let Some(description) = form.description.take() {
        memory.description = Some(description);
    }
    if let Some(visibility) = form.visibility {
        memory.visibility = visibility.as_str().to_string();
    }
    if let Some(location) = location {
        memory.lat = Some(location.lat);
        memory.lng = Some(location.lng);
    }
    if let Some(model_url) = form.model_url.take() {
        memory.model_url = Some(model_url);
    }

    // (public_id, is_video) of the media being replaced
    let mut replaced = None;
    if let Some(upload) = form.media.take() {
        let is_video = upload.kind.is_video();
        let public_id = format!("memories/{}", Uuid::new_v4());
        let (stored, caption, summary) = store_and_caption(&state, upload, &public_id).await?;

        let old_id = std::mem::replace(&mut memory.media_public_id, stored.public_id);
        replaced = Some((old_id, memory.is_video));
        memory.media_url = stored.url;
        memory.is_video = is_video;
        memory.caption = Some(caption);
        memory.summary = summary;
    }

    let id = memory.id.clone();
    let current = (memory.media_public_id.clone(), memory.is_video);
    let saved = blocking(&state, move |db| db.update_memory(&memory)).await;

    // The old media is only released once the row points at the new one.
    match (saved, replaced) {
        (Ok(true), Some((old_id, old_is_video))) => {
            discard_media(&state, &old_id, old_is_video).await
        }
        (Ok(true), None) => {}
        (outcome, replaced) => {
            if replaced.is_some() {
                discard_media(&state, &current.0, current.1).await;
            }
            outcome?;
            return Err(ApiError::not_found("Memory not found"));
        }
    }

    let row = reload(&state, id).await?;
    Ok(Json(convert::memory(row)))
}

pub async fn delete_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let memory = load_owned(&state, memory_id, &claims).await?;

    let mid = memory.id.clone();
    blocking(&state, move |db| db.delete_memory(&mid)).await?;
    discard_media(&state, &memory.media_public_id, memory.is_video).await;

    info!("{} deleted memory {}", claims.sub, memory_id);
    Ok(Json(MessageAck::new("Memory deleted successfully")))
}

/// GET /: everything the caller may see, newest first.
pub async fn feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.memories_visible_to(Some(&uid))).await?;
    Ok(Json(rows.into_iter().map(convert::memory).collect::<Vec<_>>()))
}

pub async fn public_memories(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = blocking(&state, |db| db.memories_visible_to(None)).await?;
    Ok(Json(rows.into_iter().map(convert::memory).collect::<Vec<_>>()))
}

/// POST /{id}/summary: re-describe a video's thumbnails and condense them.
pub async fn regenerate_summary(
    State(state): State<AppState>,
    Path(memory_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let mut memory = load_owned(&state, memory_id, &claims).await?;
    if !memory.is_video {
        return Err(ApiError::bad_request("Summaries are only generated for videos"));
    }

    let thumbnails = video_thumbnails(state.media.as_ref(), &memory.media_public_id);
    memory.summary = Some(state.captioner.summarize_frames(&thumbnails).await);

    let id = memory.id.clone();
    if !blocking(&state, move |db| db.update_memory(&memory)).await? {
        return Err(ApiError::not_found("Memory not found"));
    }

    let row = reload(&state, id).await?;
    Ok(Json(convert::memory(row)))
}
