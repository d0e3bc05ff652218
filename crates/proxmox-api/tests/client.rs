//! Client tests against an in-process stub of the PVE API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Form;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{delete, get, post};
use serde::Deserialize;
use serde_json::{Value, json};

use proxmox_api::{Error, ProxmoxClient, ProxmoxConfig};

#[derive(Clone, Default)]
struct Stub {
    logins: Arc<AtomicUsize>,
    node_calls: Arc<AtomicUsize>,
    /// Number of initial /nodes calls answered with 401.
    reject_nodes: Arc<AtomicUsize>,
    fail_login: bool,
}

#[derive(Deserialize)]
struct TicketForm {
    username: String,
    password: String,
}

async fn ticket(
    State(stub): State<Stub>,
    Form(body): Form<TicketForm>,
) -> (StatusCode, Json<Value>) {
    stub.logins.fetch_add(1, Ordering::SeqCst);

    if stub.fail_login || body.username != "api@pve" || body.password != "secret" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "data": null })));
    }

    (
        StatusCode::OK,
        Json(json!({
            "data": {
                "ticket": "test-ticket",
                "CSRFPreventionToken": "test-csrf",
            }
        })),
    )
}

fn has_ticket_cookie(headers: &HeaderMap) -> bool {
    headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.contains("PVEAuthCookie=test-ticket"))
}

async fn nodes(State(stub): State<Stub>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    stub.node_calls.fetch_add(1, Ordering::SeqCst);

    if stub
        .reject_nodes
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "data": null })));
    }

    if !has_ticket_cookie(&headers) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }

    (
        StatusCode::OK,
        Json(json!({ "data": [{ "node": "pve1", "status": "online" }] })),
    )
}

async fn start_vm(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let csrf_ok = headers
        .get("CSRFPreventionToken")
        .and_then(|v| v.to_str().ok())
        == Some("test-csrf");

    if !csrf_ok || !has_ticket_cookie(&headers) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }

    (
        StatusCode::OK,
        Json(json!({ "data": "UPID:pve1:0000AB:start:" })),
    )
}

async fn delete_vm() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "data": null })))
}

fn router(stub: Stub) -> Router {
    Router::new()
        .route("/api2/json/access/ticket", post(ticket))
        .route("/api2/json/nodes", get(nodes))
        .route("/api2/json/nodes/{node}/qemu/{vmid}/status/start", post(start_vm))
        .route("/api2/json/nodes/{node}/qemu/{vmid}", delete(delete_vm))
        .with_state(stub)
}

async fn serve(stub: Stub) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(stub)).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> ProxmoxClient {
    ProxmoxClient::new(ProxmoxConfig {
        host: format!("http://{addr}"),
        username: "api@pve".into(),
        password: "secret".into(),
        accept_invalid_certs: false,
    })
    .unwrap()
}

#[tokio::test]
async fn first_request_authenticates_exactly_once() {
    let stub = Stub::default();
    let addr = serve(stub.clone()).await;
    let client = client_for(addr);

    let nodes = client.nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].node, "pve1");
    assert_eq!(stub.logins.load(Ordering::SeqCst), 1);

    // The cached ticket is reused; no further logins.
    client.nodes().await.unwrap();
    assert_eq!(stub.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_first_requests_share_one_authentication() {
    let stub = Stub::default();
    let addr = serve(stub.clone()).await;
    let client = Arc::new(client_for(addr));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.nodes().await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(stub.logins.load(Ordering::SeqCst), 1);
    assert_eq!(stub.node_calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn failed_authentication_blocks_resource_calls() {
    let stub = Stub {
        fail_login: true,
        ..Stub::default()
    };
    let addr = serve(stub.clone()).await;
    let client = client_for(addr);

    let err = client.nodes().await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "got {err:?}");
    assert_eq!(stub.node_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn writes_carry_csrf_token_and_cookie() {
    let stub = Stub::default();
    let addr = serve(stub.clone()).await;
    let client = client_for(addr);

    let upid = client.start_vm("pve1", 100).await.unwrap();
    assert!(upid.starts_with("UPID:"));
}

#[tokio::test]
async fn delete_tolerates_missing_vm() {
    let stub = Stub::default();
    let addr = serve(stub.clone()).await;
    let client = client_for(addr);

    client.delete_vm("pve1", 100).await.unwrap();
}

#[tokio::test]
async fn expired_ticket_is_refreshed_once() {
    let stub = Stub::default();
    stub.reject_nodes.store(1, Ordering::SeqCst);
    let addr = serve(stub.clone()).await;
    let client = client_for(addr);

    let nodes = client.nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    // Initial login, then one re-login after the 401.
    assert_eq!(stub.logins.load(Ordering::SeqCst), 2);
    assert_eq!(stub.node_calls.load(Ordering::SeqCst), 2);
}
