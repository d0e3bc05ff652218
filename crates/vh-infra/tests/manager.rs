//! Orchestrator tests against an in-process stub of the PVE API.

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use serde_json::{Value, json};

use proxmox_api::{ProxmoxClient, ProxmoxConfig};
use vh_infra::allocator::{SequentialVmidAllocator, StaticAddressPool};
use vh_infra::types::{ProvisionRequest, VmQuota};
use vh_infra::{Error, ProxmoxManager};

#[derive(Clone, Default)]
struct Stub {
    calls: Arc<Mutex<Vec<&'static str>>>,
    created: Arc<Mutex<Option<HashMap<String, String>>>>,
    /// Statuses returned by /status/current, in order; the last one repeats.
    statuses: Arc<Mutex<VecDeque<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    fail_create: bool,
    fail_stop: bool,
    fail_start: bool,
}

impl Stub {
    fn with_statuses(statuses: &[&str]) -> Self {
        let stub = Self::default();
        *stub.statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
        stub
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

async fn ticket() -> Json<Value> {
    Json(json!({
        "data": { "ticket": "t", "CSRFPreventionToken": "c" }
    }))
}

async fn create_vm(
    State(stub): State<Stub>,
    Form(body): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    stub.record("create");
    if stub.fail_create {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    *stub.created.lock().unwrap() = Some(body);
    (StatusCode::OK, Json(json!({ "data": "UPID:pve1:create:" })))
}

async fn start_vm(State(stub): State<Stub>) -> (StatusCode, Json<Value>) {
    stub.record("start");
    let now = stub.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    stub.max_in_flight.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    stub.in_flight.fetch_sub(1, Ordering::SeqCst);

    if stub.fail_start {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    (StatusCode::OK, Json(json!({ "data": "UPID:pve1:start:" })))
}

async fn stop_vm(State(stub): State<Stub>) -> (StatusCode, Json<Value>) {
    stub.record("stop");
    if stub.fail_stop {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    (StatusCode::OK, Json(json!({ "data": "UPID:pve1:stop:" })))
}

async fn vm_status(State(stub): State<Stub>) -> Json<Value> {
    stub.record("status");
    let status = {
        let mut statuses = stub.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().cloned().unwrap_or_else(|| "stopped".into())
        }
    };
    Json(json!({ "data": { "status": status } }))
}

async fn delete_vm(State(stub): State<Stub>) -> Json<Value> {
    stub.record("delete");
    Json(json!({ "data": "UPID:pve1:delete:" }))
}

async fn serve(stub: Stub) -> SocketAddr {
    let router = Router::new()
        .route("/api2/json/access/ticket", post(ticket))
        .route("/api2/json/nodes/{node}/qemu", post(create_vm))
        .route("/api2/json/nodes/{node}/qemu/{vmid}", delete(delete_vm))
        .route("/api2/json/nodes/{node}/qemu/{vmid}/status/current", get(vm_status))
        .route("/api2/json/nodes/{node}/qemu/{vmid}/status/start", post(start_vm))
        .route("/api2/json/nodes/{node}/qemu/{vmid}/status/stop", post(stop_vm))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn manager_for(addr: SocketAddr, pool: Arc<StaticAddressPool>) -> ProxmoxManager {
    let client = ProxmoxClient::new(ProxmoxConfig {
        host: format!("http://{addr}"),
        username: "api@pve".into(),
        password: "secret".into(),
        accept_invalid_certs: false,
    })
    .unwrap();

    ProxmoxManager::new(
        Arc::new(client),
        Arc::new(SequentialVmidAllocator::new(100)),
        pool,
    )
    .with_stop_timing(Duration::from_millis(5), Duration::from_millis(200))
}

fn pool_of(addrs: &[&str]) -> Arc<StaticAddressPool> {
    Arc::new(StaticAddressPool::new(
        addrs.iter().map(|a| a.parse::<Ipv4Addr>().unwrap()),
    ))
}

fn web_server_request() -> ProvisionRequest {
    ProvisionRequest {
        name: "Web Server".into(),
        node: "pve1".into(),
        quota: VmQuota {
            cpu_cores: 2,
            ram_gb: 4,
            storage_gb: 100,
        },
    }
}

#[tokio::test]
async fn provision_submits_a_vm_request_derived_from_the_plan() {
    let stub = Stub::default();
    let addr = serve(stub.clone()).await;
    let manager = manager_for(addr, pool_of(&["192.168.1.100"]));

    let vm = manager.provision(&web_server_request()).await.unwrap();

    assert_eq!(vm.vmid, 100);
    assert!(vm.root_password.len() >= 16);
    assert_eq!(vm.address, "192.168.1.100".parse::<Ipv4Addr>().unwrap());

    let form = stub.created.lock().unwrap().clone().unwrap();
    assert_eq!(form.get("vmid").map(String::as_str), Some("100"));
    assert_eq!(form.get("name").map(String::as_str), Some("web-server"));
    assert_eq!(form.get("cores").map(String::as_str), Some("2"));
    assert_eq!(form.get("memory").map(String::as_str), Some("4096"));
    assert_eq!(form.get("scsi0").map(String::as_str), Some("local-lvm:100"));
    assert_eq!(form.get("ciuser").map(String::as_str), Some("root"));
    assert_eq!(
        form.get("cipassword").map(String::as_str),
        Some(vm.root_password.as_str())
    );
    assert_eq!(
        form.get("ipconfig0").map(String::as_str),
        Some("ip=192.168.1.100/24")
    );
}

#[tokio::test]
async fn failed_create_releases_the_claimed_address() {
    let stub = Stub {
        fail_create: true,
        ..Stub::default()
    };
    let addr = serve(stub.clone()).await;
    let pool = pool_of(&["192.168.1.100"]);
    let manager = manager_for(addr, pool.clone());

    let err = manager.provision(&web_server_request()).await.unwrap_err();
    assert!(matches!(err, Error::Proxmox(_)), "got {err:?}");

    // The address went back to the pool.
    assert_eq!(pool.free_count().await, 1);
}

#[tokio::test]
async fn deprovision_stops_then_waits_then_deletes() {
    let stub = Stub::with_statuses(&["running", "running", "stopped"]);
    let addr = serve(stub.clone()).await;
    let manager = manager_for(addr, pool_of(&[]));

    manager.deprovision("pve1", 123, None).await.unwrap();

    let calls = stub.calls();
    assert_eq!(calls.first(), Some(&"stop"));
    assert_eq!(calls.last(), Some(&"delete"));

    let stop_at = calls.iter().position(|c| *c == "stop").unwrap();
    let delete_at = calls.iter().position(|c| *c == "delete").unwrap();
    assert!(stop_at < delete_at);
    assert_eq!(
        calls.iter().filter(|c| **c == "status").count(),
        3,
        "polled until the hypervisor reported stopped: {calls:?}"
    );
}

#[tokio::test]
async fn deprovision_proceeds_when_stop_fails() {
    let stub = Stub {
        fail_stop: true,
        ..Stub::with_statuses(&["stopped"])
    };
    let addr = serve(stub.clone()).await;
    let manager = manager_for(addr, pool_of(&[]));

    manager.deprovision("pve1", 123, None).await.unwrap();

    let calls = stub.calls();
    assert!(calls.contains(&"stop"));
    assert!(calls.contains(&"delete"));
}

#[tokio::test]
async fn deprovision_times_out_if_vm_never_stops() {
    let stub = Stub::with_statuses(&["running"]);
    let addr = serve(stub.clone()).await;
    let manager = manager_for(addr, pool_of(&[]));

    let err = manager.deprovision("pve1", 123, None).await.unwrap_err();
    assert!(
        matches!(err, Error::StopTimeout { vmid: 123, .. }),
        "got {err:?}"
    );
    assert!(!stub.calls().contains(&"delete"));

    // The VM still exists, so its lock entry stays.
    assert_eq!(manager.vm_lock_count().await, 1);
}

#[tokio::test]
async fn lifecycle_operations_on_one_vmid_never_overlap() {
    let stub = Stub::default();
    let addr = serve(stub.clone()).await;
    let manager = Arc::new(manager_for(addr, pool_of(&[])));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        handles.push(tokio::spawn(
            async move { manager.start("pve1", 123).await },
        ));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(stub.calls().iter().filter(|c| **c == "start").count(), 4);
    assert_eq!(
        stub.max_in_flight.load(Ordering::SeqCst),
        1,
        "starts on the same vmid ran concurrently"
    );
}

#[tokio::test]
async fn deprovision_drops_the_vmid_lock_entry() {
    let stub = Stub::with_statuses(&["stopped"]);
    let addr = serve(stub.clone()).await;
    let manager = manager_for(addr, pool_of(&[]));

    manager.deprovision("pve1", 123, None).await.unwrap();
    assert_eq!(manager.vm_lock_count().await, 0);
}

#[tokio::test]
async fn start_failure_surfaces_a_typed_error() {
    let stub = Stub {
        fail_start: true,
        ..Stub::default()
    };
    let addr = serve(stub.clone()).await;
    let manager = manager_for(addr, pool_of(&[]));

    let err = manager.start("pve1", 123).await.unwrap_err();
    assert!(matches!(err, Error::Proxmox(_)), "got {err:?}");
}

#[tokio::test]
async fn reads_surface_transport_failures() {
    // Nothing is listening on this address.
    let client = ProxmoxClient::new(ProxmoxConfig {
        host: "http://127.0.0.1:1".into(),
        username: "api@pve".into(),
        password: "secret".into(),
        accept_invalid_certs: false,
    })
    .unwrap();
    let manager = ProxmoxManager::new(
        Arc::new(client),
        Arc::new(SequentialVmidAllocator::new(100)),
        pool_of(&[]),
    );

    assert!(manager.nodes().await.is_err());
}
