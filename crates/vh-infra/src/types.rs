use std::net::Ipv4Addr;

/// Resource quota for a VM, taken from the customer's plan.
#[derive(Debug, Clone, Copy)]
pub struct VmQuota {
    pub cpu_cores: i32,
    pub ram_gb: i32,
    pub storage_gb: i32,
}

/// Input to [`crate::ProxmoxManager::provision`].
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Customer-facing display name; sanitized before it reaches the hypervisor.
    pub name: String,
    pub node: String,
    pub quota: VmQuota,
}

/// Outcome of a successful provisioning call. Creation completes
/// asynchronously hypervisor-side; this only proves submission.
#[derive(Debug, Clone)]
pub struct ProvisionedVm {
    pub vmid: u32,
    pub root_password: String,
    pub address: Ipv4Addr,
}

/// Hypervisor-reported power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmPowerState {
    Running,
    Stopped,
    Suspended,
    Unknown,
}

impl VmPowerState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "paused" | "suspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }
}

/// Live VM status and gauges as reported by the hypervisor.
#[derive(Debug, Clone)]
pub struct VmRuntime {
    pub state: VmPowerState,
    pub cpu: Option<f64>,
    pub mem: Option<i64>,
    pub maxmem: Option<i64>,
    pub uptime: Option<i64>,
}
