use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use momentcraft_api::{AppState, AppStateInner, router};
use momentcraft_db::Database;
use momentcraft_media::caption::{
    CAPTION_UNAVAILABLE, CaptionModel, CaptionPolicy, Captioner, MediaSource, SummaryModel,
};
use momentcraft_media::host::{MediaHost, StoredMedia};
use momentcraft_types::models::MediaKind;

const BOUNDARY: &str = "momentcraft-test-boundary";

// -- Fakes --

/// Records deletions. Video frames are served as bytes naming the frame.
#[derive(Default)]
struct FakeHost {
    destroyed: Mutex<Vec<String>>,
    /// Public ids destroyed while a memory row still referenced them.
    dangling: Mutex<Vec<String>>,
    state: OnceLock<Weak<AppStateInner>>,
}

impl FakeHost {
    fn still_referenced(&self, public_id: &str) -> bool {
        let Some(state) = self.state.get().and_then(Weak::upgrade) else {
            return false;
        };
        state
            .db
            .with_conn(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE media_public_id = ?1",
                    [public_id],
                    |r| r.get(0),
                )?;
                Ok(n > 0)
            })
            .unwrap()
    }
}

#[async_trait]
impl MediaHost for FakeHost {
    async fn upload(
        &self,
        _data: Vec<u8>,
        public_id: &str,
        _file_name: &str,
        kind: MediaKind,
    ) -> Result<StoredMedia> {
        Ok(StoredMedia {
            url: format!("https://media.test/{}/{}", kind.resource_type(), public_id),
            public_id: public_id.to_string(),
        })
    }

    async fn destroy(&self, public_id: &str, _kind: MediaKind) -> Result<()> {
        if self.still_referenced(public_id) {
            self.dangling.lock().unwrap().push(public_id.to_string());
        }
        self.destroyed.lock().unwrap().push(public_id.to_string());
        Ok(())
    }

    fn thumbnail_url(&self, _public_id: &str, _offset_secs: u32) -> Option<String> {
        None
    }

    fn thumbnail(&self, public_id: &str, offset_secs: u32) -> Option<MediaSource> {
        Some(MediaSource::Bytes(format!("{public_id} at {offset_secs}s").into_bytes()))
    }
}

/// Describes an image as its decoded bytes.
struct EchoModel;

#[async_trait]
impl CaptionModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn caption(&self, image_base64: &str) -> Result<String> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD.decode(image_base64)?;
        Ok(format!("a photo of {}", String::from_utf8_lossy(&bytes)))
    }
}

struct DownModel;

#[async_trait]
impl CaptionModel for DownModel {
    fn name(&self) -> &str {
        "down"
    }

    async fn caption(&self, _image_base64: &str) -> Result<String> {
        Err(anyhow!("service unavailable"))
    }
}

struct JoinSummary;

#[async_trait]
impl SummaryModel for JoinSummary {
    async fn summarize(&self, text: &str) -> Result<String> {
        Ok(format!("summary of {}", text.lines().count()))
    }
}

struct TestApp {
    router: Router,
    host: Arc<FakeHost>,
}

fn test_app(captioner: Captioner) -> TestApp {
    let host = Arc::new(FakeHost::default());
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "integration-test-secret".into(),
        token_ttl: chrono::Duration::hours(1),
        media: host.clone(),
        captioner,
        push: None,
    });
    host.state.set(Arc::downgrade(&state)).ok();
    TestApp {
        router: router(state),
        host,
    }
}

fn fast_policy() -> CaptionPolicy {
    CaptionPolicy {
        attempts: 3,
        timeout: Duration::from_millis(200),
        pause: Duration::ZERO,
    }
}

fn echo_app() -> TestApp {
    test_app(
        Captioner::new(reqwest::Client::new())
            .with_policy(fast_policy())
            .with_primary(Arc::new(EchoModel)),
    )
}

// -- Request helpers --

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

fn request(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value) {
    send(app, request(method, uri, token).body(Body::empty()).unwrap()).await
}

async fn call_json(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let req = request(method, uri, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

async fn call_multipart(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    media: Option<(&str, &str, &[u8])>,
) -> (StatusCode, Value) {
    let mut body = Vec::new();
    for (name, value) in fields {
        let disposition = format!("Content-Disposition: form-data; name=\"{name}\"");
        let part = format!("--{BOUNDARY}\r\n{disposition}\r\n\r\n{value}\r\n");
        body.extend_from_slice(part.as_bytes());
    }
    if let Some((file_name, mime, data)) = media {
        let disposition =
            format!("Content-Disposition: form-data; name=\"media\"; filename=\"{file_name}\"");
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\n{disposition}\r\nContent-Type: {mime}\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let req = request(method, uri, Some(token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();
    send(app, req).await
}

struct User {
    id: String,
    token: String,
}

async fn register(app: &TestApp, name: &str) -> User {
    let (status, body) = call_json(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        json!({
            "username": name,
            "email": format!("{name}@example.com"),
            "password": "correct horse",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    User {
        id: body["user_id"].as_str().unwrap().to_string(),
        token: body["token"].as_str().unwrap().to_string(),
    }
}

async fn create_memory(app: &TestApp, owner: &User, title: &str, visibility: &str) -> String {
    let (status, body) = call_multipart(
        app,
        Method::POST,
        "/api/memories",
        &owner.token,
        &[("title", title), ("visibility", visibility)],
        Some(("photo.jpg", "image/jpeg", title.as_bytes())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn befriend(app: &TestApp, a: &User, b: &User) {
    let (status, _) =
        call(app, Method::POST, &format!("/api/auth/{}/request", b.id), Some(&a.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        call(app, Method::POST, &format!("/api/auth/{}/accept", a.id), Some(&b.token)).await;
    assert_eq!(status, StatusCode::OK);
}

fn titles(body: &Value) -> Vec<String> {
    let mut titles: Vec<String> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap().to_string())
        .collect();
    titles.sort();
    titles
}

// -- Tests --

#[tokio::test]
async fn register_login_and_token_checks() {
    let app = echo_app();
    let ana = register(&app, "ana").await;

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        json!({ "username": "ana2", "email": "ana@example.com", "password": "correct horse" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User already exists");

    let (status, _) = call_json(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        json!({ "username": "bo", "email": "bo@example.com", "password": "correct horse" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        json!({ "email": "ana@example.com", "password": "correct horse" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], ana.id.as_str());
    assert_eq!(body["username"], "ana");

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        json!({ "email": "ana@example.com", "password": "wrong password" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, body) = call(&app, Method::GET, "/api/memories", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Access denied. No token provided.");

    let (status, body) = call(&app, Method::GET, "/api/memories", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token.");

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn memory_edit_and_delete_are_owner_only() {
    let app = echo_app();
    let ana = register(&app, "ana").await;
    let bob = register(&app, "bob").await;

    let id = create_memory(&app, &ana, "beach", "public").await;
    let uri = format!("/api/memories/{id}");

    let (status, _) =
        call_multipart(&app, Method::PUT, &uri, &bob.token, &[("title", "mine now")], None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &uri, Some(&bob.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let missing = format!("/api/memories/{}", uuid::Uuid::new_v4());
    let (status, _) = call(&app, Method::DELETE, &missing, Some(&ana.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call_multipart(
        &app,
        Method::PUT,
        &uri,
        &ana.token,
        &[("title", "beach day"), ("visibility", "friends")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "beach day");
    assert_eq!(body["visibility"], "friends");
    assert_eq!(body["caption"], "a photo of beach");

    let (status, body) = call_multipart(
        &app,
        Method::PUT,
        &uri,
        &ana.token,
        &[("visibility", "everyone")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid visibility value. Must be private, friends, or public.");

    let (status, _) = call(&app, Method::DELETE, &uri, Some(&ana.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*app.host.destroyed.lock().unwrap(), vec![format!("memories/{id}")]);
    assert!(app.host.dangling.lock().unwrap().is_empty());

    let (status, _) = call(&app, Method::DELETE, &uri, Some(&ana.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replacing_media_recaptions_and_discards_old_upload() {
    let app = echo_app();
    let ana = register(&app, "ana").await;
    let id = create_memory(&app, &ana, "old", "private").await;

    let (status, body) = call_multipart(
        &app,
        Method::PUT,
        &format!("/api/memories/{id}"),
        &ana.token,
        &[],
        Some(("new.png", "image/png", b"sunset".as_slice())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["caption"], "a photo of sunset");
    assert_eq!(body["title"], "old");
    assert_eq!(*app.host.destroyed.lock().unwrap(), vec![format!("memories/{id}")]);
    // the row already pointed at the new upload when the old one went
    assert!(app.host.dangling.lock().unwrap().is_empty());
}

#[tokio::test]
async fn create_memory_validates_input() {
    let app = echo_app();
    let ana = register(&app, "ana").await;

    let (status, body) = call_multipart(
        &app,
        Method::POST,
        "/api/memories",
        &ana.token,
        &[("title", "no file")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Media file is required");

    let (status, _) = call_multipart(
        &app,
        Method::POST,
        "/api/memories",
        &ana.token,
        &[("title", "doc")],
        Some(("notes.pdf", "application/pdf", b"%PDF".as_slice())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call_multipart(
        &app,
        Method::POST,
        "/api/memories",
        &ana.token,
        &[("title", "pinned"), ("lat", "48.85"), ("lng", "2.35")],
        Some(("p.jpg", "image/jpeg", b"tower".as_slice())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["visibility"], "private");
    assert_eq!(body["location"]["lat"], 48.85);
    assert_eq!(body["username"], "ana");
}

#[tokio::test]
async fn video_memories_are_captioned_from_thumbnails() {
    let app = test_app(
        Captioner::new(reqwest::Client::new())
            .with_policy(fast_policy())
            .with_primary(Arc::new(EchoModel))
            .with_summarizer(Arc::new(JoinSummary)),
    );
    let ana = register(&app, "ana").await;
    let bob = register(&app, "bob").await;

    let (status, body) = call_multipart(
        &app,
        Method::POST,
        "/api/memories",
        &ana.token,
        &[("title", "surf"), ("visibility", "public")],
        Some(("surf.mp4", "video/mp4", b"frames".as_slice())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["is_video"], true);
    assert_eq!(body["caption"], format!("a photo of memories/{id} at 1s"));
    let frames: Vec<String> =
        [1, 5, 10].iter().map(|s| format!("a photo of memories/{id} at {s}s")).collect();
    assert_eq!(body["summary"], frames.join(" "));

    let summary_uri = format!("/api/memories/{id}/summary");
    let (status, _) = call(&app, Method::POST, &summary_uri, Some(&bob.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::POST, &summary_uri, Some(&ana.token)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["summary"], "summary of 3");
    assert_eq!(body["caption"], format!("a photo of memories/{id} at 1s"));

    let photo = create_memory(&app, &ana, "still", "public").await;
    let (status, body) =
        call(&app, Method::POST, &format!("/api/memories/{photo}/summary"), Some(&ana.token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Summaries are only generated for videos");
}

#[tokio::test]
async fn malformed_input_is_a_json_bad_request() {
    let app = echo_app();
    let ana = register(&app, "ana").await;

    let (status, body) =
        call_json(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "username": "anna" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A valid email is required");

    let req = request(Method::POST, "/api/auth/login", None)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (status, body) =
        call(&app, Method::DELETE, "/api/memories/not-a-uuid", Some(&ana.token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/messages/{}?limit=lots", ana.id),
        Some(&ana.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (_, timeline) = call_json(
        &app,
        Method::POST,
        "/api/timelines",
        Some(&ana.token),
        json!({ "name": "Trip", "description": "Summer" }),
    )
    .await;
    let share = json!({ "timelineId": timeline["id"], "friendIds": ["bogus"] });
    let (status, body) =
        call_json(&app, Method::POST, "/api/auth/share-timeline", Some(&ana.token), share).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Some friend IDs are invalid or not your friends");

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/api/memories",
        Some(&ana.token),
        json!({ "title": "x" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
}

#[tokio::test]
async fn feed_respects_visibility_and_friendship() {
    let app = echo_app();
    let ana = register(&app, "ana").await;
    let bob = register(&app, "bob").await;

    create_memory(&app, &ana, "secret", "private").await;
    create_memory(&app, &ana, "circle", "friends").await;
    create_memory(&app, &ana, "open", "public").await;

    let (_, feed) = call(&app, Method::GET, "/api/memories", Some(&bob.token)).await;
    assert_eq!(titles(&feed), ["open"]);

    let (status, public) = call(&app, Method::GET, "/api/memories/public", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&public), ["open"]);

    befriend(&app, &bob, &ana).await;

    let (_, feed) = call(&app, Method::GET, "/api/memories", Some(&bob.token)).await;
    assert_eq!(titles(&feed), ["circle", "open"]);

    let (_, own) = call(&app, Method::GET, "/api/memories", Some(&ana.token)).await;
    assert_eq!(titles(&own), ["circle", "open", "secret"]);

    // unfriending revokes access again
    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/auth/{}/friends", ana.id),
        Some(&bob.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, feed) = call(&app, Method::GET, "/api/memories", Some(&bob.token)).await;
    assert_eq!(titles(&feed), ["open"]);
}

#[tokio::test]
async fn friend_request_lifecycle() {
    let app = echo_app();
    let ana = register(&app, "ana").await;
    let bob = register(&app, "bob").await;
    let request_bob = format!("/api/auth/{}/request", bob.id);
    let request_ana = format!("/api/auth/{}/request", ana.id);

    let (status, _) = call(&app, Method::POST, &request_ana, Some(&ana.token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/auth/{}/request", uuid::Uuid::new_v4()),
        Some(&ana.token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::POST, &request_bob, Some(&ana.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::POST, &request_bob, Some(&ana.token)).await;
    assert_eq!(body["error"], "Request already sent");
    let (_, body) = call(&app, Method::POST, &request_ana, Some(&bob.token)).await;
    assert_eq!(body["error"], "Request already pending");

    let (_, lists) = call(&app, Method::GET, "/api/auth/me/friends", Some(&bob.token)).await;
    assert_eq!(lists["pending_requests"][0]["username"], "ana");
    let (_, lists) = call(&app, Method::GET, "/api/auth/me/friends", Some(&ana.token)).await;
    assert_eq!(lists["sent_requests"][0]["username"], "bob");

    let (status, _) =
        call(&app, Method::POST, &format!("/api/auth/{}/decline", ana.id), Some(&bob.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) =
        call(&app, Method::POST, &format!("/api/auth/{}/accept", ana.id), Some(&bob.token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No pending request from this user");

    befriend(&app, &ana, &bob).await;

    let (_, body) = call(&app, Method::POST, &request_bob, Some(&ana.token)).await;
    assert_eq!(body["error"], "Already friends");

    for user in [&ana, &bob] {
        let (_, lists) = call(&app, Method::GET, "/api/auth/me/friends", Some(&user.token)).await;
        assert_eq!(lists["friends"].as_array().unwrap().len(), 1);
        assert!(lists["pending_requests"].as_array().unwrap().is_empty());
        assert!(lists["sent_requests"].as_array().unwrap().is_empty());
    }

    let (_, profile) =
        call(&app, Method::GET, &format!("/api/auth/profile/{}", bob.id), Some(&ana.token)).await;
    assert_eq!(profile["friends"][0], ana.id.as_str());
}

#[tokio::test]
async fn failed_captioning_stores_sentinel() {
    let app = test_app(
        Captioner::new(reqwest::Client::new())
            .with_policy(fast_policy())
            .with_primary(Arc::new(DownModel))
            .with_fallback(Arc::new(DownModel)),
    );
    let ana = register(&app, "ana").await;

    let (status, body) = call_multipart(
        &app,
        Method::POST,
        "/api/memories",
        &ana.token,
        &[("title", "fog")],
        Some(("fog.jpg", "image/jpeg", b"grey".as_slice())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["caption"], CAPTION_UNAVAILABLE);
}

#[tokio::test]
async fn timeline_membership_and_access() {
    let app = echo_app();
    let ana = register(&app, "ana").await;
    let bob = register(&app, "bob").await;

    let (status, _) = call_json(
        &app,
        Method::POST,
        "/api/timelines",
        Some(&ana.token),
        json!({ "name": "Trip" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, timeline) = call_json(
        &app,
        Method::POST,
        "/api/timelines",
        Some(&ana.token),
        json!({ "name": "Trip", "description": "Summer" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tid = timeline["id"].as_str().unwrap().to_string();

    let first = create_memory(&app, &ana, "first", "public").await;
    let second = create_memory(&app, &ana, "second", "private").await;
    let bobs = create_memory(&app, &bob, "bobs", "private").await;

    for mid in [&first, &second] {
        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("/api/timelines/{tid}/memories/{mid}"),
            Some(&ana.token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    // adding twice keeps a single entry
    let (_, body) = call(
        &app,
        Method::PUT,
        &format!("/api/timelines/{tid}/memories/{first}"),
        Some(&ana.token),
    )
    .await;
    assert_eq!(body["memories"].as_array().unwrap().len(), 2);

    // bob's private memory is invisible to ana
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/api/timelines/{tid}/memories/{bobs}"),
        Some(&ana.token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    // only the owner may change the timeline
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/api/timelines/{tid}/memories/{bobs}"),
        Some(&bob.token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) =
        call(&app, Method::GET, &format!("/api/timelines/{tid}"), Some(&bob.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let reorder = format!("/api/timelines/{tid}/reorder");
    let (status, _) = call_json(
        &app,
        Method::PUT,
        &reorder,
        Some(&ana.token),
        json!({ "memory_ids": [second, bobs] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = call_json(
        &app,
        Method::PUT,
        &reorder,
        Some(&ana.token),
        json!({ "memoryIds": [second, first] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memories"][0]["id"], second.as_str());
    assert_eq!(body["memories"][1]["id"], first.as_str());

    let (status, public) =
        call(&app, Method::GET, &format!("/api/timelines/public/{tid}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["username"], "ana");
    assert_eq!(public["memories"].as_array().unwrap().len(), 1);
    assert_eq!(public["memories"][0]["id"], first.as_str());

    // deleting a memory drops it from the timeline
    let (status, _) =
        call(&app, Method::DELETE, &format!("/api/memories/{second}"), Some(&ana.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, full) =
        call(&app, Method::GET, &format!("/api/timelines/{tid}"), Some(&ana.token)).await;
    assert_eq!(full["memories"].as_array().unwrap().len(), 1);

    let (status, _) =
        call(&app, Method::DELETE, &format!("/api/timelines/{tid}"), Some(&bob.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) =
        call(&app, Method::DELETE, &format!("/api/timelines/{tid}"), Some(&ana.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        call(&app, Method::GET, &format!("/api/timelines/{tid}"), Some(&ana.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sharing_a_timeline_with_friends() {
    let app = echo_app();
    let ana = register(&app, "ana").await;
    let bob = register(&app, "bob").await;
    let eve = register(&app, "eve").await;

    let (_, timeline) = call_json(
        &app,
        Method::POST,
        "/api/timelines",
        Some(&ana.token),
        json!({ "name": "Family", "description": "Us" }),
    )
    .await;
    let tid = timeline["id"].as_str().unwrap().to_string();
    let shown = create_memory(&app, &ana, "dinner", "friends").await;
    let hidden = create_memory(&app, &ana, "diary", "private").await;
    for mid in [&shown, &hidden] {
        call(
            &app,
            Method::PUT,
            &format!("/api/timelines/{tid}/memories/{mid}"),
            Some(&ana.token),
        )
        .await;
    }

    let share = json!({ "timeline_id": tid, "friend_ids": [bob.id] });
    let (status, body) = call_json(
        &app,
        Method::POST,
        "/api/auth/share-timeline",
        Some(&ana.token),
        share.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Some friend IDs are invalid or not your friends");

    befriend(&app, &ana, &bob).await;
    let (status, _) = call_json(
        &app,
        Method::POST,
        "/api/auth/share-timeline",
        Some(&ana.token),
        share.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        call_json(&app, Method::POST, "/api/auth/share-timeline", Some(&ana.token), share).await;
    assert_eq!(status, StatusCode::OK);

    let (_, shared) =
        call(&app, Method::GET, "/api/auth/me/shared-timelines", Some(&bob.token)).await;
    let shared = shared.as_array().unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0]["memories"].as_array().unwrap().len(), 1);
    assert_eq!(shared[0]["memories"][0]["title"], "dinner");

    let (status, full) =
        call(&app, Method::GET, &format!("/api/timelines/{tid}"), Some(&bob.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(full["memories"].as_array().unwrap().len(), 1);

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api/auth/me/shared-timelines/{}", bob.id),
        Some(&eve.token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api/auth/me/shared-timelines/{}", bob.id),
        Some(&ana.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn direct_messages() {
    let app = echo_app();
    let ana = register(&app, "ana").await;
    let bob = register(&app, "bob").await;

    let send_uri = format!("/api/messages/send/{}", bob.id);
    let (status, _) = call_json(
        &app,
        Method::POST,
        &send_uri,
        Some(&ana.token),
        json!({ "content": "  " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call_json(
        &app,
        Method::POST,
        &format!("/api/messages/send/{}", uuid::Uuid::new_v4()),
        Some(&ana.token),
        json!({ "content": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for text in ["hi", "how are you?"] {
        let (status, _) = call_json(
            &app,
            Method::POST,
            &send_uri,
            Some(&ana.token),
            json!({ "content": text }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    call_json(
        &app,
        Method::POST,
        &format!("/api/messages/send/{}", ana.id),
        Some(&bob.token),
        json!({ "content": "good" }),
    )
    .await;

    let (status, convo) =
        call(&app, Method::GET, &format!("/api/messages/{}", ana.id), Some(&bob.token)).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> =
        convo.as_array().unwrap().iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, ["good", "how are you?", "hi"]);

    let (_, page) = call(
        &app,
        Method::GET,
        &format!("/api/messages/{}?limit=1", ana.id),
        Some(&bob.token),
    )
    .await;
    assert_eq!(page.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn push_endpoints_without_vapid_keys() {
    let app = echo_app();
    let ana = register(&app, "ana").await;

    let (status, _) = call(&app, Method::GET, "/api/push/vapid-public-key", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call_json(
        &app,
        Method::POST,
        "/api/push/subscribe",
        Some(&ana.token),
        json!({ "subscription": { "endpoint": "https://push.test/1" } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let subscription = json!({
        "subscription": {
            "endpoint": "https://push.test/1",
            "keys": { "p256dh": "BPk", "auth": "c2VjcmV0" },
        }
    });
    let (status, _) =
        call_json(&app, Method::POST, "/api/push/subscribe", Some(&ana.token), subscription).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) =
        call(&app, Method::POST, &format!("/api/push/notify/{}", ana.id), Some(&ana.token)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = call_json(
        &app,
        Method::DELETE,
        "/api/push/subscribe",
        Some(&ana.token),
        json!({ "endpoint": "https://push.test/1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call_json(
        &app,
        Method::DELETE,
        "/api/push/subscribe",
        Some(&ana.token),
        json!({ "endpoint": "https://push.test/1" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
