//! Request/response shapes for the HTTP surface. Database rows carry
//! fields the API must not leak (root passwords in particular), so every
//! outbound type is an explicit projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vh_db::models::{Plan, Vps, VpsStatus};
use vh_infra::types::{VmPowerState, VmRuntime};

#[derive(Debug, Deserialize)]
pub struct CreateVpsRequest {
    pub plan_id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct VpsResponse {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub vmid: i32,
    pub name: String,
    pub status: VpsStatus,
    pub ip_address: Option<String>,
    pub node_name: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Vps> for VpsResponse {
    fn from(vps: Vps) -> Self {
        Self {
            id: vps.id,
            plan_id: vps.plan_id,
            vmid: vps.vmid,
            name: vps.name,
            status: vps.status,
            ip_address: vps.ip_address,
            node_name: vps.node_name,
            expires_at: vps.expires_at,
            created_at: vps.created_at,
            updated_at: vps.updated_at,
        }
    }
}

/// Creation response. The root password is returned exactly once, here;
/// no other endpoint exposes it.
#[derive(Debug, Serialize)]
pub struct ProvisionedVpsResponse {
    #[serde(flatten)]
    pub vps: VpsResponse,
    pub root_password: String,
}

#[derive(Debug, Serialize)]
pub struct VpsRuntimeResponse {
    pub state: &'static str,
    pub cpu: Option<f64>,
    pub mem: Option<i64>,
    pub maxmem: Option<i64>,
    pub uptime: Option<i64>,
}

impl From<VmRuntime> for VpsRuntimeResponse {
    fn from(runtime: VmRuntime) -> Self {
        Self {
            state: match runtime.state {
                VmPowerState::Running => "running",
                VmPowerState::Stopped => "stopped",
                VmPowerState::Suspended => "suspended",
                VmPowerState::Unknown => "unknown",
            },
            cpu: runtime.cpu,
            mem: runtime.mem,
            maxmem: runtime.maxmem,
            uptime: runtime.uptime,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cpu_cores: i32,
    pub ram_gb: i32,
    pub storage_gb: i32,
    pub bandwidth_gb: i32,
    pub price_monthly_cents: i64,
    pub price_yearly_cents: i64,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            description: plan.description,
            cpu_cores: plan.cpu_cores,
            ram_gb: plan.ram_gb,
            storage_gb: plan.storage_gb,
            bandwidth_gb: plan.bandwidth_gb,
            price_monthly_cents: plan.price_monthly_cents,
            price_yearly_cents: plan.price_yearly_cents,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub node: String,
    pub status: String,
    pub cpu: Option<f64>,
    pub mem: Option<i64>,
    pub maxmem: Option<i64>,
    pub uptime: Option<i64>,
}

impl From<proxmox_api::Node> for NodeResponse {
    fn from(node: proxmox_api::Node) -> Self {
        Self {
            node: node.node,
            status: node.status,
            cpu: node.cpu,
            mem: node.mem,
            maxmem: node.maxmem,
            uptime: node.uptime,
        }
    }
}

/// One-shot VNC ticket for the browser console.
#[derive(Debug, Serialize)]
pub struct ConsoleResponse {
    pub ticket: String,
    pub port: String,
    pub user: Option<String>,
}

impl From<proxmox_api::VncProxy> for ConsoleResponse {
    fn from(proxy: proxmox_api::VncProxy) -> Self {
        Self {
            ticket: proxy.ticket,
            port: proxy.port,
            user: proxy.user,
        }
    }
}
