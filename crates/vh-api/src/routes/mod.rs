use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::auth_middleware;
use crate::state::AppState;

mod nodes;
mod plans;
mod vps;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/vps", post(vps::create_vps).get(vps::list_vps))
        .route("/vps/{id}", get(vps::get_vps).delete(vps::destroy_vps))
        .route("/vps/{id}/status", get(vps::vps_runtime))
        .route("/vps/{id}/start", post(vps::start_vps))
        .route("/vps/{id}/stop", post(vps::stop_vps))
        .route("/vps/{id}/restart", post(vps::restart_vps))
        .route("/vps/{id}/console", post(vps::open_console))
        .route("/plans", get(plans::list_plans))
        .route("/nodes", get(nodes::list_nodes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
