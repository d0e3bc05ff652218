use std::net::Ipv4Addr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;
use vh_db::models::{Plan, Vps, VpsStatus};
use vh_infra::types::{ProvisionRequest, VmQuota};

use crate::auth::UserId;
use crate::dto::{
    ConsoleResponse, CreateVpsRequest, ProvisionedVpsResponse, VpsResponse, VpsRuntimeResponse,
};
use crate::error::ApiError;
use crate::reconciler;
use crate::state::AppState;

/// `POST /vps` — provision a new service from a plan.
pub async fn create_vps(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(req): Json<CreateVpsRequest>,
) -> Result<(StatusCode, Json<ProvisionedVpsResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }

    let plan = match Plan::get_by_id(&state.db, req.plan_id).await {
        Ok(plan) => plan,
        Err(sqlx::Error::RowNotFound) => {
            return Err(ApiError::BadRequest("unknown plan".into()));
        }
        Err(e) => return Err(e.into()),
    };
    if !plan.is_active {
        return Err(ApiError::BadRequest("plan is not available".into()));
    }

    let vm = state
        .manager
        .provision(&ProvisionRequest {
            name: req.name.clone(),
            node: state.config.default_node.clone(),
            quota: VmQuota {
                cpu_cores: plan.cpu_cores,
                ram_gb: plan.ram_gb,
                storage_gb: plan.storage_gb,
            },
        })
        .await?;

    let vps = reconciler::record_provisioned(
        &state.db,
        &state.notifier,
        user_id.0,
        &plan,
        &req.name,
        &state.config.default_node,
        &vm,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProvisionedVpsResponse {
            vps: vps.into(),
            root_password: vm.root_password,
        }),
    ))
}

/// `GET /vps` — the caller's live services.
pub async fn list_vps(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<Vec<VpsResponse>>, ApiError> {
    let vpses = Vps::list_for_user(&state.db, user_id.0).await?;
    Ok(Json(vpses.into_iter().map(VpsResponse::from).collect()))
}

/// `GET /vps/{id}` — one service, with the stored status refreshed from
/// the hypervisor when it is reachable.
pub async fn get_vps(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<VpsResponse>, ApiError> {
    let vps = owned_vps(&state, id, user_id).await?;
    let vps = reconciler::sync_observed_state(&state.db, &state.notifier, &state.manager, vps).await;
    Ok(Json(vps.into()))
}

/// `GET /vps/{id}/status` — live runtime gauges straight from the
/// hypervisor.
pub async fn vps_runtime(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<VpsRuntimeResponse>, ApiError> {
    let vps = owned_vps(&state, id, user_id).await?;
    let runtime = state
        .manager
        .status(&vps.node_name, vps.vmid as u32)
        .await?;
    Ok(Json(runtime.into()))
}

/// `POST /vps/{id}/start`
pub async fn start_vps(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<VpsResponse>, ApiError> {
    let vps = owned_vps(&state, id, user_id).await?;
    if vps.status != VpsStatus::Stopped {
        return Err(ApiError::Conflict(format!(
            "cannot start a vps in status {}",
            vps.status.as_str()
        )));
    }

    if let Err(e) = state.manager.start(&vps.node_name, vps.vmid as u32).await {
        reconciler::record_failed_operation(&state.db, &state.notifier, &vps, &e).await;
        return Err(e.into());
    }
    let updated =
        reconciler::record_transition(&state.db, &state.notifier, &vps, VpsStatus::Running).await?;
    Ok(Json(updated.into()))
}

/// `POST /vps/{id}/stop`
pub async fn stop_vps(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<VpsResponse>, ApiError> {
    let vps = owned_vps(&state, id, user_id).await?;
    if vps.status != VpsStatus::Running {
        return Err(ApiError::Conflict(format!(
            "cannot stop a vps in status {}",
            vps.status.as_str()
        )));
    }

    if let Err(e) = state.manager.stop(&vps.node_name, vps.vmid as u32).await {
        reconciler::record_failed_operation(&state.db, &state.notifier, &vps, &e).await;
        return Err(e.into());
    }
    let updated =
        reconciler::record_transition(&state.db, &state.notifier, &vps, VpsStatus::Stopped).await?;
    Ok(Json(updated.into()))
}

/// `POST /vps/{id}/restart` — reboots a running VM; a stopped VM is
/// simply started.
pub async fn restart_vps(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<VpsResponse>, ApiError> {
    let vps = owned_vps(&state, id, user_id).await?;
    let result = match vps.status {
        VpsStatus::Running => state.manager.restart(&vps.node_name, vps.vmid as u32).await,
        VpsStatus::Stopped => state.manager.start(&vps.node_name, vps.vmid as u32).await,
        other => {
            return Err(ApiError::Conflict(format!(
                "cannot restart a vps in status {}",
                other.as_str()
            )));
        }
    };
    if let Err(e) = result {
        reconciler::record_failed_operation(&state.db, &state.notifier, &vps, &e).await;
        return Err(e.into());
    }

    let updated =
        reconciler::record_transition(&state.db, &state.notifier, &vps, VpsStatus::Running).await?;
    Ok(Json(updated.into()))
}

/// `DELETE /vps/{id}` — tear down the VM, release its address, and
/// soft-delete the record.
pub async fn destroy_vps(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let vps = owned_vps(&state, id, user_id).await?;

    let address: Option<Ipv4Addr> = vps.ip_address.as_deref().and_then(|a| a.parse().ok());
    if let Err(e) = state
        .manager
        .deprovision(&vps.node_name, vps.vmid as u32, address)
        .await
    {
        reconciler::record_failed_operation(&state.db, &state.notifier, &vps, &e).await;
        return Err(e.into());
    }

    reconciler::record_deprovisioned(&state.db, &state.notifier, &vps).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /vps/{id}/console` — one-shot VNC ticket.
pub async fn open_console(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConsoleResponse>, ApiError> {
    let vps = owned_vps(&state, id, user_id).await?;
    let proxy = state
        .manager
        .console_proxy(&vps.node_name, vps.vmid as u32)
        .await?;
    Ok(Json(proxy.into()))
}

/// Fetch a record the caller owns, or 404. Other users' services are
/// indistinguishable from nonexistent ones.
async fn owned_vps(state: &AppState, id: Uuid, user_id: UserId) -> Result<Vps, ApiError> {
    Vps::get_for_user(&state.db, id, user_id.0)
        .await?
        .ok_or(ApiError::NotFound)
}
