use std::sync::Arc;

use tracing::error;

use momentcraft_db::Database;
use momentcraft_media::caption::Captioner;
use momentcraft_media::host::MediaHost;
use momentcraft_media::push::PushSender;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Lifetime of issued tokens.
    pub token_ttl: chrono::Duration,
    pub media: Arc<dyn MediaHost>,
    pub captioner: Captioner,
    /// `None` when VAPID keys are not configured.
    pub push: Option<Arc<dyn PushSender>>,
}

/// Run a database closure on the blocking pool.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("Server error".into())
        })?
        .map_err(ApiError::from)
}
