mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use momentcraft_api::{AppState, AppStateInner};
use momentcraft_db::Database;
use momentcraft_media::caption::Captioner;
use momentcraft_media::cloudinary::CloudinaryHost;
use momentcraft_media::host::MediaHost;
use momentcraft_media::inference::{BartSummarizer, BlipCaptioner, OpenAiVisionCaptioner};
use momentcraft_media::local::LocalMediaStore;
use momentcraft_media::push::{PushSender, VapidKeys, WebPushSender};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "momentcraft=debug,momentcraft_api=debug,momentcraft_db=debug,momentcraft_media=debug,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = Database::open(&config.db_path)?;
    let http = reqwest::Client::builder().user_agent("momentcraft-backend").build()?;

    // Media host: Cloudinary when configured, local disk otherwise
    let (media, served_dir): (Arc<dyn MediaHost>, Option<PathBuf>) = match &config.cloudinary {
        Some(cloudinary) => {
            let host: Arc<dyn MediaHost> =
                Arc::new(CloudinaryHost::new(http.clone(), cloudinary.clone()));
            (host, None)
        }
        None => {
            warn!("Cloudinary not configured; storing media locally (no video thumbnails)");
            let store =
                LocalMediaStore::new(config.upload_dir.clone(), config.public_url.clone()).await?;
            let dir = store.dir().to_path_buf();
            let host: Arc<dyn MediaHost> = Arc::new(store);
            (host, Some(dir))
        }
    };

    let mut captioner = Captioner::new(http.clone());
    match &config.hugging_face_key {
        Some(key) => {
            captioner = captioner
                .with_primary(Arc::new(BlipCaptioner::new(http.clone(), key.clone())))
                .with_summarizer(Arc::new(BartSummarizer::new(http.clone(), key.clone())));
        }
        None => warn!("HUGGING_FACE_API_KEY not set; primary captioning disabled"),
    }
    if let Some(key) = &config.openai_key {
        captioner = captioner
            .with_fallback(Arc::new(OpenAiVisionCaptioner::new(http.clone(), key.clone())));
    }

    let push: Option<Arc<dyn PushSender>> = match &config.vapid {
        Some(vapid) => {
            let keys = VapidKeys::from_base64(
                &vapid.private_key,
                vapid.public_key.as_deref(),
                vapid.subject.clone(),
            )?;
            info!("Web push enabled for {}", vapid.subject);
            let sender: Arc<dyn PushSender> = Arc::new(WebPushSender::new(http.clone(), keys));
            Some(sender)
        }
        None => {
            info!("VAPID keys not configured; push notifications disabled");
            None
        }
    };

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: chrono::Duration::hours(config.token_ttl_hours),
        media,
        captioner,
        push,
    });

    let mut app = momentcraft_api::router(state);
    if let Some(dir) = served_dir {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }
    let app = app
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("MomentCraft server listening on {}", addr);
    info!("Upload limit: {} MB", config.max_upload_bytes / (1024 * 1024));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
