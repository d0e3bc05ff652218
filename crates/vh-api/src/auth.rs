use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;
use vh_db::models::Session;

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller, injected into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

/// Resolves the caller from a bearer session token. Sessions are written
/// by the identity provider; this service only validates them.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match authenticate(&state, req.headers()).await {
        Ok(user_id) => {
            req.extensions_mut().insert(user_id);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let session = Session::get_valid_by_token(&state.db, token)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(UserId(session.user_id))
}
