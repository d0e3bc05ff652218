use serde::{Deserialize, Serialize};

/// Every Proxmox response wraps its payload in a `data` field.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct TicketData {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: String,
}

// ── Node types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Node {
    pub node: String,
    pub status: String,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub mem: Option<i64>,
    #[serde(default)]
    pub maxmem: Option<i64>,
    #[serde(default)]
    pub uptime: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub uptime: Option<i64>,
    #[serde(default)]
    pub cpu: Option<f64>,
}

/// Entry from `/cluster/resources`. The `type` discriminator is `qemu`,
/// `node`, `storage` etc.; fields not applicable to a kind are absent.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub vmid: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

// ── QEMU types ───────────────────────────────────────────────────────

/// Form-encoded body for `POST /nodes/{node}/qemu`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateVmRequest {
    pub vmid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ostype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    /// Memory in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootdisk: Option<String>,
    /// Primary disk, `storage:size_gb` form (e.g. `local-lvm:100`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scsi0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net0: Option<String>,
    /// Cloud-init drive, e.g. `local:cloudinit`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ide2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ciuser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipassword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searchdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameserver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipconfig0: Option<String>,
    /// 1 = start the VM once creation completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmStatus {
    /// `running`, `stopped` or `paused`.
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub mem: Option<i64>,
    #[serde(default)]
    pub maxmem: Option<i64>,
    #[serde(default)]
    pub uptime: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cores: Option<u32>,
    /// Returned as an integer by older PVE releases and a string by newer
    /// ones, so left untyped.
    #[serde(default)]
    pub memory: Option<serde_json::Value>,
    #[serde(default)]
    pub ostype: Option<String>,
    #[serde(default)]
    pub net0: Option<String>,
    #[serde(default)]
    pub ipconfig0: Option<String>,
}

/// Form-encoded body for `PUT /nodes/{node}/qemu/{vmid}/config`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateVmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipconfig0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboot: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VncProxy {
    pub ticket: String,
    /// PVE returns the port as a JSON string.
    pub port: String,
    #[serde(default)]
    pub user: Option<String>,
}
