pub mod allocator;
pub mod credentials;
pub mod manager;
pub mod types;

pub use manager::{DnsConfig, ProxmoxManager};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("hypervisor error: {0}")]
    Proxmox(#[from] proxmox_api::Error),

    #[error("address pool exhausted")]
    AddressPoolExhausted,

    #[error("invalid address in pool: {0}")]
    InvalidAddress(String),

    #[error("vm {vmid} did not reach stopped state within {waited_secs}s")]
    StopTimeout { vmid: u32, waited_secs: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
