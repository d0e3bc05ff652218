mod auth;
mod config;
mod dto;
mod error;
mod monitor;
mod notify;
mod reconciler;
mod routes;
mod state;

use std::sync::Arc;

use proxmox_api::{ProxmoxClient, ProxmoxConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use vh_db::models::Vps;
use vh_infra::allocator::{SequentialVmidAllocator, StaticAddressPool};
use vh_infra::{DnsConfig, ProxmoxManager};

use crate::config::AppConfig;
use crate::notify::Notifier;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let db = vh_db::create_pool(&config.database_url)
        .await
        .expect("failed to connect to database");
    vh_db::run_migrations(&db)
        .await
        .expect("failed to run migrations");

    let client = ProxmoxClient::new(ProxmoxConfig {
        host: config.proxmox_host.clone(),
        username: config.proxmox_username.clone(),
        password: config.proxmox_password.clone(),
        accept_invalid_certs: config.proxmox_insecure_tls,
    })
    .expect("failed to build proxmox client");

    // Seed the vmid sequence above everything the store has handed out.
    let max_vmid = Vps::max_vmid(&db).await.expect("failed to read max vmid");
    let vmids =
        SequentialVmidAllocator::seeded(max_vmid.map(|v| v as u32), config.vmid_floor);

    // Address pool = configured pool minus addresses live records hold.
    let addrs =
        StaticAddressPool::parse(&config.ip_pool).expect("IP_POOL must be a list of IPv4 addresses");
    let pool = StaticAddressPool::new(addrs);
    for assigned in Vps::assigned_addresses(&db)
        .await
        .expect("failed to read assigned addresses")
    {
        if let Ok(addr) = assigned.parse() {
            pool.remove(addr).await;
        }
    }
    tracing::info!(free = pool.free_count().await, "address pool seeded");

    let manager = Arc::new(
        ProxmoxManager::new(Arc::new(client), Arc::new(vmids), Arc::new(pool)).with_dns(
            DnsConfig {
                searchdomain: config.searchdomain.clone(),
                nameserver: config.nameserver.clone(),
            },
        ),
    );

    let notifier = Notifier::new(config.webhook_url.clone(), config.webhook_api_key.clone());

    monitor::spawn_health_monitor(
        db.clone(),
        manager.clone(),
        notifier.clone(),
        config.health_interval_secs,
    );

    let listen_addr = config.listen_addr;
    let state = AppState {
        db,
        manager,
        notifier,
        config: Arc::new(config),
    };

    let app = routes::api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(addr = %listen_addr, "hosting control plane listening");
    axum::serve(listener, app).await.expect("server error");
}
