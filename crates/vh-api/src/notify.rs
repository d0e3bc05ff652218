//! Webhook notifier for the automation pipeline (welcome emails, expiry
//! reminders). Delivery is fire-and-forget: failures are logged and the
//! event is dropped, nothing in the request path waits on it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use vh_db::models::{Vps, VpsStatus};

#[derive(Clone)]
pub struct Notifier {
    webhook_url: Option<String>,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    event: &'static str,
    data: Value,
    timestamp: DateTime<Utc>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>, api_key: String) -> Self {
        Self {
            webhook_url,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    pub fn vps_created(&self, vps: &Vps, plan_name: &str) {
        self.dispatch("vps.created", created_data(vps, plan_name));
    }

    pub fn vps_status_changed(&self, vps: &Vps, old: VpsStatus, new: VpsStatus) {
        self.dispatch("vps.status_changed", status_changed_data(vps, old, new));
    }

    pub fn vps_deleted(&self, vps: &Vps) {
        self.dispatch("vps.deleted", deleted_data(vps));
    }

    pub fn vps_expiring(&self, vps: &Vps, days_left: i64) {
        self.dispatch("vps.expiring", expiring_data(vps, days_left));
    }

    fn dispatch(&self, event: &'static str, data: Value) {
        let Some(url) = self.webhook_url.clone() else {
            tracing::debug!(event, "webhook not configured, dropping event");
            return;
        };

        let payload = WebhookPayload {
            event,
            data,
            timestamp: Utc::now(),
        };
        let http = self.http.clone();
        let api_key = self.api_key.clone();

        tokio::spawn(async move {
            let result = http
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(event, status = %resp.status(), "webhook rejected event");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(event, error = %e, "webhook delivery failed"),
            }
        });
    }
}

fn created_data(vps: &Vps, plan_name: &str) -> Value {
    json!({
        "vps_id": vps.id,
        "user_id": vps.user_id,
        "name": vps.name,
        "plan": plan_name,
        "ip_address": vps.ip_address,
        "created_at": vps.created_at,
    })
}

fn status_changed_data(vps: &Vps, old: VpsStatus, new: VpsStatus) -> Value {
    json!({
        "vps_id": vps.id,
        "user_id": vps.user_id,
        "name": vps.name,
        "old_status": old,
        "new_status": new,
    })
}

fn deleted_data(vps: &Vps) -> Value {
    json!({
        "vps_id": vps.id,
        "user_id": vps.user_id,
        "name": vps.name,
    })
}

fn expiring_data(vps: &Vps, days_left: i64) -> Value {
    json!({
        "vps_id": vps.id,
        "user_id": vps.user_id,
        "name": vps.name,
        "expires_at": vps.expires_at,
        "days_until_expiry": days_left,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_vps() -> Vps {
        Vps {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            plan_id: Uuid::nil(),
            vmid: 1001,
            name: "web-server".into(),
            status: VpsStatus::Running,
            ip_address: Some("192.168.1.100".into()),
            root_password: "hunter2hunter2hunter2".into(),
            node_name: "pve1".into(),
            expires_at: Utc::now(),
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn payloads_never_carry_the_root_password() {
        let vps = sample_vps();
        for data in [
            created_data(&vps, "starter"),
            status_changed_data(&vps, VpsStatus::Running, VpsStatus::Stopped),
            deleted_data(&vps),
            expiring_data(&vps, 3),
        ] {
            assert!(!data.to_string().contains("hunter2"));
        }
    }

    #[test]
    fn status_change_reports_both_sides() {
        let data = status_changed_data(&sample_vps(), VpsStatus::Running, VpsStatus::Stopped);
        assert_eq!(data["old_status"], "running");
        assert_eq!(data["new_status"], "stopped");
    }

    #[test]
    fn expiry_payload_carries_the_countdown() {
        let data = expiring_data(&sample_vps(), 3);
        assert_eq!(data["days_until_expiry"], 3);
    }
}
