use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

// ── Plan ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cpu_cores: i32,
    pub ram_gb: i32,
    pub storage_gb: i32,
    pub bandwidth_gb: i32,
    pub price_monthly_cents: i64,
    pub price_yearly_cents: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewPlan<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub cpu_cores: i32,
    pub ram_gb: i32,
    pub storage_gb: i32,
    pub bandwidth_gb: i32,
    pub price_monthly_cents: i64,
    pub price_yearly_cents: i64,
}

impl Plan {
    pub async fn insert(pool: &PgPool, plan: &NewPlan<'_>) -> sqlx::Result<Self> {
        sqlx::query_as(
            r#"INSERT INTO plans (name, description, cpu_cores, ram_gb, storage_gb, bandwidth_gb,
                                  price_monthly_cents, price_yearly_cents)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(plan.name)
        .bind(plan.description)
        .bind(plan.cpu_cores)
        .bind(plan.ram_gb)
        .bind(plan.storage_gb)
        .bind(plan.bandwidth_gb)
        .bind(plan.price_monthly_cents)
        .bind(plan.price_yearly_cents)
        .fetch_one(pool)
        .await
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Self> {
        sqlx::query_as("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM plans ORDER BY price_monthly_cents")
            .fetch_all(pool)
            .await
    }

    pub async fn list_active(pool: &PgPool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM plans WHERE is_active ORDER BY price_monthly_cents")
            .fetch_all(pool)
            .await
    }
}

// ── User ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    /// `user` or `admin`.
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Self> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

// ── Session (read-only — the identity provider writes these) ────────

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub session_token: String,
    pub user_id: Uuid,
    pub expires: DateTime<Utc>,
}

impl Session {
    /// Look up a session by its token, returning `None` if expired or not found.
    pub async fn get_valid_by_token(pool: &PgPool, token: &str) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM sessions WHERE session_token = $1 AND expires > now()")
            .bind(token)
            .fetch_optional(pool)
            .await
    }
}

// ── Vps ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "vps_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VpsStatus {
    Creating,
    Running,
    Stopped,
    Suspended,
    Error,
}

impl VpsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Suspended => "suspended",
            Self::Error => "error",
        }
    }
}

/// Durable record of a customer VPS. `vmid` + `node_name` address the
/// underlying hypervisor VM; rows are soft-deleted via `deleted_at` when
/// the VM is destroyed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Vps {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub vmid: i32,
    pub name: String,
    pub status: VpsStatus,
    pub ip_address: Option<String>,
    pub root_password: String,
    pub node_name: String,
    pub expires_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewVps<'a> {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub vmid: i32,
    pub name: &'a str,
    pub ip_address: Option<&'a str>,
    pub root_password: &'a str,
    pub node_name: &'a str,
    pub expires_at: DateTime<Utc>,
}

impl Vps {
    pub async fn insert(pool: &PgPool, vps: &NewVps<'_>) -> sqlx::Result<Self> {
        sqlx::query_as(
            r#"INSERT INTO vpses (user_id, plan_id, vmid, name, ip_address, root_password, node_name, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(vps.user_id)
        .bind(vps.plan_id)
        .bind(vps.vmid)
        .bind(vps.name)
        .bind(vps.ip_address)
        .bind(vps.root_password)
        .bind(vps.node_name)
        .bind(vps.expires_at)
        .fetch_one(pool)
        .await
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Self> {
        sqlx::query_as("SELECT * FROM vpses WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Fetch a record only if it belongs to the given user and is not
    /// soft-deleted.
    pub async fn get_for_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> sqlx::Result<Option<Self>> {
        sqlx::query_as(
            "SELECT * FROM vpses WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as(
            "SELECT * FROM vpses WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn set_status(pool: &PgPool, id: Uuid, status: VpsStatus) -> sqlx::Result<()> {
        sqlx::query("UPDATE vpses SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Soft delete: the hypervisor VM is gone, the billing record stays.
    pub async fn mark_deleted(pool: &PgPool, id: Uuid) -> sqlx::Result<()> {
        sqlx::query("UPDATE vpses SET deleted_at = now(), updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Highest vmid ever recorded, for seeding the vmid sequence.
    pub async fn max_vmid(pool: &PgPool) -> sqlx::Result<Option<i32>> {
        let (max,): (Option<i32>,) = sqlx::query_as("SELECT MAX(vmid) FROM vpses")
            .fetch_one(pool)
            .await?;
        Ok(max)
    }

    /// Addresses currently held by live records, for seeding the address pool.
    pub async fn assigned_addresses(pool: &PgPool) -> sqlx::Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT ip_address FROM vpses WHERE ip_address IS NOT NULL AND deleted_at IS NULL",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(addr,)| addr).collect())
    }

    /// Live records expiring before the cutoff, oldest first.
    pub async fn list_expiring_before(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as(
            r#"SELECT * FROM vpses
               WHERE expires_at < $1 AND deleted_at IS NULL
               ORDER BY expires_at"#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }
}
