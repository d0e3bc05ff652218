use std::env;
use std::net::SocketAddr;

/// Runtime configuration, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,

    pub proxmox_host: String,
    pub proxmox_username: String,
    pub proxmox_password: String,
    /// Accept self-signed hypervisor certificates (lab clusters).
    pub proxmox_insecure_tls: bool,
    /// Node new VMs land on until placement gets smarter.
    pub default_node: String,

    /// New vmids always start above this, even on an empty database.
    pub vmid_floor: u32,
    /// Comma-separated list of customer-facing addresses.
    pub ip_pool: String,
    pub searchdomain: String,
    pub nameserver: String,

    /// Automation webhook; events are dropped when unset.
    pub webhook_url: Option<String>,
    pub webhook_api_key: String,

    pub health_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            listen_addr: env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".into())
                .parse()
                .expect("LISTEN_ADDR must be a valid socket address"),
            proxmox_host: env::var("PROXMOX_HOST").expect("PROXMOX_HOST must be set"),
            proxmox_username: env::var("PROXMOX_USERNAME").expect("PROXMOX_USERNAME must be set"),
            proxmox_password: env::var("PROXMOX_PASSWORD").expect("PROXMOX_PASSWORD must be set"),
            proxmox_insecure_tls: env::var("PROXMOX_INSECURE_TLS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            default_node: env::var("DEFAULT_NODE").unwrap_or_else(|_| "pve1".into()),
            vmid_floor: env::var("VMID_FLOOR")
                .unwrap_or_else(|_| "1000".into())
                .parse()
                .expect("VMID_FLOOR must be a number"),
            ip_pool: env::var("IP_POOL").expect("IP_POOL must be set"),
            searchdomain: env::var("SEARCH_DOMAIN").unwrap_or_else(|_| "vhost.internal".into()),
            nameserver: env::var("NAMESERVER").unwrap_or_else(|_| "8.8.8.8".into()),
            webhook_url: env::var("WEBHOOK_URL").ok(),
            webhook_api_key: env::var("WEBHOOK_API_KEY").unwrap_or_default(),
            health_interval_secs: env::var("HEALTH_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .expect("HEALTH_INTERVAL_SECS must be a number"),
        }
    }
}
