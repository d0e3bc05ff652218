//! Keeps VPS records in line with confirmed hypervisor outcomes. Every
//! status write goes through here, so webhook events and the database
//! can never disagree about a transition.

use chrono::{DateTime, Duration, Months, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vh_db::models::{NewVps, Plan, Vps, VpsStatus};
use vh_infra::ProxmoxManager;
use vh_infra::types::{ProvisionedVm, VmPowerState};

use crate::notify::Notifier;

/// Fixed initial term for a new service.
pub fn initial_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_add_months(Months::new(1))
        .unwrap_or_else(|| now + Duration::days(30))
}

/// Persist a freshly submitted VM and announce it. The record starts in
/// `creating`; the first status sync moves it on once the hypervisor
/// finishes.
pub async fn record_provisioned(
    db: &PgPool,
    notifier: &Notifier,
    user_id: Uuid,
    plan: &Plan,
    name: &str,
    node: &str,
    vm: &ProvisionedVm,
) -> sqlx::Result<Vps> {
    let address = vm.address.to_string();
    let vps = Vps::insert(
        db,
        &NewVps {
            user_id,
            plan_id: plan.id,
            vmid: vm.vmid as i32,
            name,
            ip_address: Some(&address),
            root_password: &vm.root_password,
            node_name: node,
            expires_at: initial_expiry(Utc::now()),
        },
    )
    .await?;

    notifier.vps_created(&vps, &plan.name);
    Ok(vps)
}

/// Apply a confirmed status transition and announce it. A no-op when the
/// stored status already matches.
pub async fn record_transition(
    db: &PgPool,
    notifier: &Notifier,
    vps: &Vps,
    new_status: VpsStatus,
) -> sqlx::Result<Vps> {
    if vps.status == new_status {
        return Ok(vps.clone());
    }

    Vps::set_status(db, vps.id, new_status).await?;
    let updated = Vps::get_by_id(db, vps.id).await?;

    notifier.vps_status_changed(&updated, vps.status, new_status);
    Ok(updated)
}

/// True when the hypervisor itself rejected or failed the operation, as
/// opposed to transport trouble reaching it.
pub fn is_unrecoverable(err: &vh_infra::Error) -> bool {
    matches!(
        err,
        vh_infra::Error::Proxmox(proxmox_api::Error::Api { .. })
            | vh_infra::Error::StopTimeout { .. }
    )
}

/// Record a failed lifecycle operation. A hypervisor-reported failure
/// moves the record to `error`; transient transport failures leave the
/// stored status alone so a later attempt can succeed. A record in
/// `error` recovers through the read-through sync once the VM reports a
/// mappable state again.
pub async fn record_failed_operation(
    db: &PgPool,
    notifier: &Notifier,
    vps: &Vps,
    err: &vh_infra::Error,
) {
    if !is_unrecoverable(err) {
        return;
    }
    if let Err(e) = record_transition(db, notifier, vps, VpsStatus::Error).await {
        tracing::error!(vps_id = %vps.id, error = %e, "failed to record error status");
    }
}

/// Soft-delete after the hypervisor VM is confirmed gone.
pub async fn record_deprovisioned(
    db: &PgPool,
    notifier: &Notifier,
    vps: &Vps,
) -> sqlx::Result<()> {
    Vps::mark_deleted(db, vps.id).await?;
    notifier.vps_deleted(vps);
    Ok(())
}

/// Map an observed power state onto the record's status set. `None`
/// means the observation carries no usable signal.
pub fn observed_status(state: VmPowerState) -> Option<VpsStatus> {
    match state {
        VmPowerState::Running => Some(VpsStatus::Running),
        VmPowerState::Stopped => Some(VpsStatus::Stopped),
        VmPowerState::Suspended => Some(VpsStatus::Suspended),
        VmPowerState::Unknown => None,
    }
}

/// Best-effort read-through sync: pull the live state and record a
/// transition when it differs. An unreachable hypervisor falls back to
/// the stored record.
pub async fn sync_observed_state(
    db: &PgPool,
    notifier: &Notifier,
    manager: &ProxmoxManager,
    vps: Vps,
) -> Vps {
    let runtime = match manager.status(&vps.node_name, vps.vmid as u32).await {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::debug!(vps_id = %vps.id, error = %e, "live state unavailable, serving stored record");
            return vps;
        }
    };

    let Some(status) = observed_status(runtime.state) else {
        return vps;
    };

    match record_transition(db, notifier, &vps, status).await {
        Ok(updated) => updated,
        Err(e) => {
            tracing::warn!(vps_id = %vps.id, error = %e, "failed to persist observed state");
            vps
        }
    }
}
