use axum::Json;
use axum::extract::State;
use axum::Extension;
use vh_db::models::User;

use crate::auth::UserId;
use crate::dto::NodeResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /nodes` — cluster node overview, admin only.
pub async fn list_nodes(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<Vec<NodeResponse>>, ApiError> {
    let user = User::get_by_id(&state.db, user_id.0).await?;
    if !user.is_admin() {
        return Err(ApiError::Forbidden("admin role required".into()));
    }

    let nodes = state.manager.nodes().await?;
    Ok(Json(nodes.into_iter().map(NodeResponse::from).collect()))
}
