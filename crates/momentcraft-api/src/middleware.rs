use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use momentcraft_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| ApiError::Unauthorized("Access denied. No token provided.".into()))?;

    let claims = verify_token(&state.jwt_secret, bearer.token())
        .ok_or_else(|| ApiError::Unauthorized("Invalid token.".into()))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| debug!("Rejected token: {}", e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_token;
    use uuid::Uuid;

    #[test]
    fn token_round_trip_and_wrong_secret() {
        let id = Uuid::new_v4();
        let token = create_token("secret-a", chrono::Duration::hours(1), id, "ana").unwrap();

        let claims = verify_token("secret-a", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.username, "ana");

        assert!(verify_token("secret-b", &token).is_none());
        assert!(verify_token("secret-a", "not.a.jwt").is_none());
    }

    #[test]
    fn expired_token_rejected() {
        let token = create_token("s", chrono::Duration::hours(-2), Uuid::new_v4(), "old").unwrap();
        assert!(verify_token("s", &token).is_none());
    }
}
