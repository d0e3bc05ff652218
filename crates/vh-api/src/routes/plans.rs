use axum::Json;
use axum::extract::State;
use vh_db::models::Plan;

use crate::dto::PlanResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /plans` — plans currently open for purchase.
pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<PlanResponse>>, ApiError> {
    let plans = Plan::list_active(&state.db).await?;
    Ok(Json(plans.into_iter().map(PlanResponse::from).collect()))
}
