use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use proxmox_api::{ClusterResource, CreateVmRequest, Node, ProxmoxClient, VncProxy};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::allocator::{AddressAllocator, VmidAllocator};
use crate::credentials::{self, MIN_PASSWORD_LEN};
use crate::types::{ProvisionRequest, ProvisionedVm, VmPowerState, VmQuota, VmRuntime};
use crate::{Error, Result};

/// DNS settings injected into every VM via cloud-init.
#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub searchdomain: String,
    pub nameserver: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            searchdomain: "vhost.internal".into(),
            nameserver: "8.8.8.8".into(),
        }
    }
}

const DEFAULT_STOP_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// VM lifecycle orchestrator over the Proxmox client.
///
/// Lifecycle operations on the same vmid are serialized through a
/// per-vmid lock, so two callers can never interleave e.g. a restart
/// with a delete.
pub struct ProxmoxManager {
    client: Arc<ProxmoxClient>,
    vmids: Arc<dyn VmidAllocator>,
    addresses: Arc<dyn AddressAllocator>,
    dns: DnsConfig,
    stop_poll_interval: Duration,
    stop_timeout: Duration,
    vm_locks: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

impl ProxmoxManager {
    pub fn new(
        client: Arc<ProxmoxClient>,
        vmids: Arc<dyn VmidAllocator>,
        addresses: Arc<dyn AddressAllocator>,
    ) -> Self {
        Self {
            client,
            vmids,
            addresses,
            dns: DnsConfig::default(),
            stop_poll_interval: DEFAULT_STOP_POLL_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            vm_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_dns(mut self, dns: DnsConfig) -> Self {
        self.dns = dns;
        self
    }

    pub fn with_stop_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.stop_poll_interval = poll_interval;
        self.stop_timeout = timeout;
        self
    }

    async fn vm_lock(&self, vmid: u32) -> Arc<Mutex<()>> {
        self.vm_locks
            .lock()
            .await
            .entry(vmid)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Provision a new VPS: allocate a vmid, generate root credentials,
    /// claim an address, and submit the creation. Returns once the
    /// hypervisor accepts the request; provisioning itself completes
    /// asynchronously.
    pub async fn provision(&self, req: &ProvisionRequest) -> Result<ProvisionedVm> {
        let vmid = self.vmids.allocate().await?;
        let root_password = credentials::generate_root_password(MIN_PASSWORD_LEN);
        let address = self.addresses.claim().await?;

        let create = build_vm_request(
            vmid,
            &req.name,
            &req.quota,
            &root_password,
            address,
            &self.dns,
        );

        // The claimed address goes back to the pool if the hypervisor
        // refuses the VM; a partially created VM is not rolled back.
        if let Err(e) = self.client.create_vm(&req.node, &create).await {
            self.addresses.release(address).await;
            return Err(e.into());
        }

        info!(vmid, node = %req.node, address = %address, "vm creation submitted");

        Ok(ProvisionedVm {
            vmid,
            root_password,
            address,
        })
    }

    pub async fn start(&self, node: &str, vmid: u32) -> Result<()> {
        let lock = self.vm_lock(vmid).await;
        let _guard = lock.lock().await;

        self.client.start_vm(node, vmid).await?;
        info!(vmid, node, "vm start issued");
        Ok(())
    }

    pub async fn stop(&self, node: &str, vmid: u32) -> Result<()> {
        let lock = self.vm_lock(vmid).await;
        let _guard = lock.lock().await;

        self.client.stop_vm(node, vmid).await?;
        info!(vmid, node, "vm stop issued");
        Ok(())
    }

    pub async fn restart(&self, node: &str, vmid: u32) -> Result<()> {
        let lock = self.vm_lock(vmid).await;
        let _guard = lock.lock().await;

        self.client.reboot_vm(node, vmid).await?;
        info!(vmid, node, "vm reboot issued");
        Ok(())
    }

    /// Tear down a VM: best-effort stop, wait until the hypervisor
    /// reports it stopped, then delete. The wait polls the live status
    /// instead of sleeping a fixed interval; a VM the hypervisor no
    /// longer knows about counts as stopped.
    pub async fn deprovision(
        &self,
        node: &str,
        vmid: u32,
        address: Option<Ipv4Addr>,
    ) -> Result<()> {
        let lock = self.vm_lock(vmid).await;
        let guard = lock.lock().await;

        self.teardown(node, vmid, address).await?;

        drop(guard);
        drop(lock);
        self.forget_vm_lock(vmid).await;
        Ok(())
    }

    async fn teardown(&self, node: &str, vmid: u32, address: Option<Ipv4Addr>) -> Result<()> {
        if let Err(e) = self.client.stop_vm(node, vmid).await {
            warn!(vmid, node, error = %e, "stop before delete failed, proceeding");
        }

        self.wait_until_stopped(node, vmid).await?;

        self.client.delete_vm(node, vmid).await?;

        if let Some(addr) = address {
            self.addresses.release(addr).await;
        }

        info!(vmid, node, "vm deleted");
        Ok(())
    }

    /// Drop a deleted VM's lock entry, unless another task still holds a
    /// clone. The map never carries a deleted vmid longer than its last
    /// in-flight operation.
    async fn forget_vm_lock(&self, vmid: u32) {
        let mut locks = self.vm_locks.lock().await;
        if locks.get(&vmid).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&vmid);
        }
    }

    /// Number of vmids currently holding a lifecycle lock entry.
    pub async fn vm_lock_count(&self) -> usize {
        self.vm_locks.lock().await.len()
    }

    async fn wait_until_stopped(&self, node: &str, vmid: u32) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.stop_timeout;

        loop {
            match self.client.vm_status(node, vmid).await {
                Ok(status) if VmPowerState::parse(&status.status) == VmPowerState::Stopped => {
                    return Ok(());
                }
                Ok(status) => {
                    tracing::debug!(vmid, status = %status.status, "waiting for vm to stop");
                }
                Err(proxmox_api::Error::Api { status, .. }) if status.as_u16() == 404 => {
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::StopTimeout {
                    vmid,
                    waited_secs: self.stop_timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.stop_poll_interval).await;
        }
    }

    pub async fn status(&self, node: &str, vmid: u32) -> Result<VmRuntime> {
        let status = self.client.vm_status(node, vmid).await?;
        Ok(VmRuntime {
            state: VmPowerState::parse(&status.status),
            cpu: status.cpu,
            mem: status.mem,
            maxmem: status.maxmem,
            uptime: status.uptime,
        })
    }

    pub async fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self.client.nodes().await?)
    }

    pub async fn cluster_resources(&self) -> Result<Vec<ClusterResource>> {
        Ok(self.client.cluster_resources().await?)
    }

    /// VNC ticket for the browser-side console.
    pub async fn console_proxy(&self, node: &str, vmid: u32) -> Result<VncProxy> {
        Ok(self.client.vnc_proxy(node, vmid).await?)
    }
}

/// Build the creation payload from a plan quota. Core/memory/disk fields
/// are a direct function of the quota: cores map 1:1, RAM converts to MB,
/// the disk claims `storage_gb` on local-lvm.
pub fn build_vm_request(
    vmid: u32,
    display_name: &str,
    quota: &VmQuota,
    root_password: &str,
    address: Ipv4Addr,
    dns: &DnsConfig,
) -> CreateVmRequest {
    let name = vm_name(display_name);
    let name = if name.is_empty() {
        format!("vps-{vmid}")
    } else {
        name
    };

    CreateVmRequest {
        vmid,
        name: Some(name),
        ostype: Some("l26".into()),
        cores: Some(quota.cpu_cores.max(1) as u32),
        memory: Some(quota.ram_gb.max(1) as u32 * 1024),
        bootdisk: Some("scsi0".into()),
        scsi0: Some(format!("local-lvm:{}", quota.storage_gb)),
        net0: Some("virtio,bridge=vmbr0".into()),
        ide2: Some("local:cloudinit".into()),
        ciuser: Some("root".into()),
        cipassword: Some(root_password.into()),
        searchdomain: Some(dns.searchdomain.clone()),
        nameserver: Some(dns.nameserver.clone()),
        ipconfig0: Some(format!("ip={address}/24")),
        start: Some(1),
    }
}

/// Hypervisor VM names must be DNS-safe; display names are free-form.
fn vm_name(display: &str) -> String {
    let mut out = String::with_capacity(display.len());
    for c in display.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
