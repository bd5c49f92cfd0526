pub mod auth;
pub mod convert;
pub mod error;
pub mod extract;
pub mod friends;
pub mod memories;
pub mod messages;
pub mod middleware;
pub mod push;
pub mod routes;
pub mod state;
pub mod timelines;

pub use routes::router;
pub use state::{AppState, AppStateInner};
