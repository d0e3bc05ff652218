use std::sync::Arc;

use sqlx::PgPool;
use vh_infra::ProxmoxManager;

use crate::config::AppConfig;
use crate::notify::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub manager: Arc<ProxmoxManager>,
    pub notifier: Notifier,
    pub config: Arc<AppConfig>,
}
