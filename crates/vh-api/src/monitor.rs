//! Periodic background sweep: probes cluster health and flags services
//! approaching expiry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;
use vh_db::models::Vps;
use vh_infra::ProxmoxManager;

use crate::notify::Notifier;

const EXPIRY_WARNING_DAYS: i64 = 7;

pub fn spawn_health_monitor(
    db: PgPool,
    manager: Arc<ProxmoxManager>,
    notifier: Notifier,
    interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // Records already flagged as expiring; each gets one webhook per
        // process lifetime.
        let mut flagged: HashSet<Uuid> = HashSet::new();
        loop {
            interval.tick().await;

            match manager.nodes().await {
                Ok(nodes) => {
                    let online = nodes.iter().filter(|n| n.status == "online").count();
                    if online < nodes.len() {
                        tracing::warn!(total = nodes.len(), online, "cluster has offline nodes");
                    } else {
                        tracing::info!(total = nodes.len(), "cluster health probe ok");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "cluster health probe failed"),
            }

            if let Err(e) = sweep_expiring(&db, &notifier, &mut flagged).await {
                tracing::error!(error = %e, "expiry sweep failed");
            }
        }
    });
}

async fn sweep_expiring(
    db: &PgPool,
    notifier: &Notifier,
    flagged: &mut HashSet<Uuid>,
) -> sqlx::Result<()> {
    let cutoff = Utc::now() + chrono::Duration::days(EXPIRY_WARNING_DAYS);
    let expiring = Vps::list_expiring_before(db, cutoff).await?;
    for vps in newly_expiring(flagged, expiring) {
        let days_left = (vps.expires_at - Utc::now()).num_days().max(0);
        tracing::info!(vps_id = %vps.id, days_left, "vps approaching expiry");
        notifier.vps_expiring(&vps, days_left);
    }
    Ok(())
}

/// Keep only records not flagged before, marking them as flagged.
fn newly_expiring(flagged: &mut HashSet<Uuid>, expiring: Vec<Vps>) -> Vec<Vps> {
    expiring
        .into_iter()
        .filter(|vps| flagged.insert(vps.id))
        .collect()
}
