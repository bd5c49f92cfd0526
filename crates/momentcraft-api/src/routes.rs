use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, friends, memories, messages, push, timelines};

/// The full HTTP surface. Transport layers (CORS, tracing, body limit,
/// static uploads) are added by the server binary.
pub fn router(state: AppState) -> Router {
    let authed = middleware::from_fn_with_state(state.clone(), require_auth);

    let auth_routes = Router::new()
        .route("/all", get(friends::all_users))
        .route("/search", get(friends::search_user))
        .route("/profile/{user_id}", get(friends::profile))
        .route("/{user_id}/friends", post(friends::add_friend).delete(friends::remove_friend))
        .route("/{user_id}/request", post(friends::send_request))
        .route("/{user_id}/accept", post(friends::accept_request))
        .route("/{user_id}/decline", post(friends::decline_request))
        .route("/me/friends", get(friends::my_friends))
        .route("/share-timeline", post(friends::share_timeline))
        .route("/me/shared-timelines", get(friends::my_shared_timelines))
        .route("/me/shared-timelines/{friend_id}", get(friends::friend_shared_timelines))
        .route_layer(authed.clone())
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let memory_routes = Router::new()
        .route("/", post(memories::create_memory).get(memories::feed))
        .route("/{memory_id}", put(memories::edit_memory).delete(memories::delete_memory))
        .route("/{memory_id}/summary", post(memories::regenerate_summary))
        .route_layer(authed.clone())
        .route("/public", get(memories::public_memories));

    let timeline_routes = Router::new()
        .route("/", post(timelines::create_timeline).get(timelines::list_timelines))
        .route("/{timeline_id}", get(timelines::get_timeline).delete(timelines::delete_timeline))
        .route(
            "/{timeline_id}/memories/{memory_id}",
            put(timelines::add_memory).delete(timelines::remove_memory),
        )
        .route("/{timeline_id}/reorder", put(timelines::reorder))
        .route_layer(authed.clone())
        .route("/public/{timeline_id}", get(timelines::public_timeline));

    let message_routes = Router::new()
        .route("/send/{recipient_id}", post(messages::send_message))
        .route("/{user_id}", get(messages::get_conversation))
        .route_layer(authed.clone());

    let push_routes = Router::new()
        .route("/subscribe", post(push::subscribe).delete(push::unsubscribe))
        .route("/notify/{user_id}", post(push::notify))
        .route_layer(authed)
        .route("/vapid-public-key", get(push::vapid_public_key));

    Router::new()
        .route("/", get(|| async { "MomentCraft Backend" }))
        .route("/health", get(|| async { "ok" }))
        .nest("/api/auth", auth_routes)
        .nest("/api/memories", memory_routes)
        .nest("/api/timelines", timeline_routes)
        .nest("/api/messages", message_routes)
        .nest("/api/push", push_routes)
        .with_state(state)
}
