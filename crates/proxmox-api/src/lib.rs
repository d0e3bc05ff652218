//! Typed Rust client for the Proxmox VE HTTP API.
//!
//! Covers the subset needed for managing customer VMs: ticket
//! authentication, node and cluster queries, and QEMU lifecycle
//! (create, status, start, stop, reboot, config, delete, console).

mod types;

pub use types::*;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("proxmox api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("proxmox api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("proxmox api {endpoint} returned no data")]
    NoData { endpoint: &'static str },

    #[error("proxmox authentication failed: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Connection settings for a Proxmox cluster.
#[derive(Debug, Clone)]
pub struct ProxmoxConfig {
    /// Base URL including scheme and port, e.g. `https://pve.example.com:8006`.
    pub host: String,
    /// API user in `user@realm` form.
    pub username: String,
    pub password: String,
    /// Accept self-signed certificates (common on standalone PVE hosts).
    pub accept_invalid_certs: bool,
}

/// Cached authentication state: the PVE ticket plus the anti-CSRF token
/// required on state-changing calls. Never leaves this module.
#[derive(Clone)]
struct Session {
    ticket: String,
    csrf_token: String,
}

const EMPTY_FORM: &[(&str, &str)] = &[];

/// Client for the Proxmox VE REST API.
///
/// The session ticket is acquired lazily on the first call and shared by
/// all requests from this instance. The session lock is held across the
/// login round-trip, so concurrent callers racing on an empty cache
/// trigger exactly one authentication.
pub struct ProxmoxClient {
    config: ProxmoxConfig,
    http: reqwest::Client,
    session: Mutex<Option<Session>>,
}

impl ProxmoxClient {
    pub fn new(config: ProxmoxConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            config,
            http,
            session: Mutex::new(None),
        })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api2/json{path}", self.config.host)
    }

    /// Authenticate against the ticket endpoint and cache the session.
    ///
    /// Calling this is optional; any request authenticates on demand.
    pub async fn login(&self) -> Result<()> {
        let session = self.fetch_ticket().await?;
        *self.session.lock().await = Some(session);
        Ok(())
    }

    async fn fetch_ticket(&self) -> Result<Session> {
        let resp = self
            .http
            .post(self.url("/access/ticket"))
            .form(&[
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Auth(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Auth(format!("ticket endpoint returned {status}")));
        }

        let body: ApiResponse<TicketData> = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed ticket response: {e}")))?;

        let data = body
            .data
            .ok_or_else(|| Error::Auth("ticket response carried no data".into()))?;

        Ok(Session {
            ticket: data.ticket,
            csrf_token: data.csrf_token,
        })
    }

    /// Return the cached session, authenticating first if none exists.
    async fn session(&self) -> Result<Session> {
        let mut guard = self.session.lock().await;
        if let Some(session) = &*guard {
            return Ok(session.clone());
        }
        let session = self.fetch_ticket().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }

    /// Issue an authenticated request. The ticket rides as a cookie on
    /// every call; non-GET calls additionally carry the anti-CSRF token
    /// and a form-encoded body. A 401 drops the cached ticket and retries
    /// once with a fresh one.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        form: Option<&B>,
    ) -> Result<reqwest::Response> {
        let mut retried = false;
        loop {
            let session = self.session().await?;

            let mut req = self
                .http
                .request(method.clone(), self.url(path))
                .header("Cookie", format!("PVEAuthCookie={}", session.ticket));

            if method != Method::GET {
                req = req.header("CSRFPreventionToken", &session.csrf_token);
            }

            if let Some(body) = form {
                req = req.form(body);
            } else if method != Method::GET {
                req = req.form(EMPTY_FORM);
            }

            let resp = req.send().await?;

            if resp.status() == StatusCode::UNAUTHORIZED && !retried {
                retried = true;
                self.invalidate_session().await;
                continue;
            }

            return Ok(resp);
        }
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    /// Like `check` but also treats 404 as success (for delete idempotency).
    async fn check_allow_404(
        resp: reqwest::Response,
        endpoint: &'static str,
    ) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 404 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    /// Request expecting a `{ data: T }` envelope.
    async fn request_data<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Option<&B>,
        endpoint: &'static str,
    ) -> Result<T> {
        let resp = self.send(method, path, form).await?;
        let body: ApiResponse<T> = Self::check(resp, endpoint).await?.json().await?;
        body.data.ok_or(Error::NoData { endpoint })
    }

    /// Request where the response body is ignored.
    async fn request_unit<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        form: Option<&B>,
        endpoint: &'static str,
        allow_404: bool,
    ) -> Result<()> {
        let resp = self.send(method, path, form).await?;
        if allow_404 {
            Self::check_allow_404(resp, endpoint).await?;
        } else {
            Self::check(resp, endpoint).await?;
        }
        Ok(())
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str, endpoint: &'static str) -> Result<T> {
        self.request_data::<[(&str, &str)], T>(Method::GET, path, None, endpoint)
            .await
    }

    // ── Nodes and cluster ────────────────────────────────────────────

    pub async fn nodes(&self) -> Result<Vec<Node>> {
        self.get_data("/nodes", "list nodes").await
    }

    pub async fn node_status(&self, node: &str) -> Result<NodeStatus> {
        self.get_data(&format!("/nodes/{node}/status"), "node status")
            .await
    }

    pub async fn cluster_resources(&self) -> Result<Vec<ClusterResource>> {
        self.get_data("/cluster/resources", "cluster resources")
            .await
    }

    // ── QEMU lifecycle ───────────────────────────────────────────────

    /// Submit a VM creation. Returns the task UPID; the hypervisor
    /// provisions asynchronously.
    pub async fn create_vm(&self, node: &str, req: &CreateVmRequest) -> Result<String> {
        self.request_data(
            Method::POST,
            &format!("/nodes/{node}/qemu"),
            Some(req),
            "create vm",
        )
        .await
    }

    pub async fn delete_vm(&self, node: &str, vmid: u32) -> Result<()> {
        self.request_unit::<[(&str, &str)]>(
            Method::DELETE,
            &format!("/nodes/{node}/qemu/{vmid}"),
            None,
            "delete vm",
            true,
        )
        .await
    }

    pub async fn vm_status(&self, node: &str, vmid: u32) -> Result<VmStatus> {
        self.get_data(
            &format!("/nodes/{node}/qemu/{vmid}/status/current"),
            "vm status",
        )
        .await
    }

    pub async fn start_vm(&self, node: &str, vmid: u32) -> Result<String> {
        self.request_data::<[(&str, &str)], String>(
            Method::POST,
            &format!("/nodes/{node}/qemu/{vmid}/status/start"),
            None,
            "start vm",
        )
        .await
    }

    pub async fn stop_vm(&self, node: &str, vmid: u32) -> Result<String> {
        self.request_data::<[(&str, &str)], String>(
            Method::POST,
            &format!("/nodes/{node}/qemu/{vmid}/status/stop"),
            None,
            "stop vm",
        )
        .await
    }

    pub async fn reboot_vm(&self, node: &str, vmid: u32) -> Result<String> {
        self.request_data::<[(&str, &str)], String>(
            Method::POST,
            &format!("/nodes/{node}/qemu/{vmid}/status/reboot"),
            None,
            "reboot vm",
        )
        .await
    }

    pub async fn vm_config(&self, node: &str, vmid: u32) -> Result<VmConfig> {
        self.get_data(&format!("/nodes/{node}/qemu/{vmid}/config"), "vm config")
            .await
    }

    pub async fn update_vm_config(
        &self,
        node: &str,
        vmid: u32,
        config: &UpdateVmConfig,
    ) -> Result<()> {
        self.request_unit(
            Method::PUT,
            &format!("/nodes/{node}/qemu/{vmid}/config"),
            Some(config),
            "update vm config",
            false,
        )
        .await
    }

    /// Open a VNC console channel for the browser-side terminal.
    pub async fn vnc_proxy(&self, node: &str, vmid: u32) -> Result<VncProxy> {
        self.request_data::<[(&str, &str)], VncProxy>(
            Method::POST,
            &format!("/nodes/{node}/qemu/{vmid}/vncproxy"),
            None,
            "vnc proxy",
        )
        .await
    }
}
