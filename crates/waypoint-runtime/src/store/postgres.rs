use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use waypoint_core::config::StoreConfig;
use waypoint_core::{
    AgentId, BoxFuture, MembershipSet, MembershipStore, Result, ServiceName, WaypointError,
};

use super::LockKind;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS waypoint_locks (
        service TEXT NOT NULL,
        kind TEXT NOT NULL,
        holder UUID NOT NULL,
        acquired_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        lease_until TIMESTAMPTZ,
        PRIMARY KEY (service, kind)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS waypoint_memberships (
        service TEXT PRIMARY KEY,
        endpoints JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS waypoint_watch_heartbeats (
        service TEXT PRIMARY KEY,
        last_watch_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Membership store shared by every process pointed at the same database.
///
/// Locks are lease rows: a row can be taken over only once its
/// `lease_until` has passed, and a `NULL` lease never expires.
#[derive(Clone)]
pub struct PgMembershipStore {
    pool: PgPool,
    holder: AgentId,
    fetch_lock_ttl: Duration,
    watch_lock_ttl: Option<Duration>,
}

impl PgMembershipStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool, holder: AgentId, config: &StoreConfig) -> Self {
        Self {
            pool,
            holder,
            fetch_lock_ttl: config.fetch_lock_ttl(),
            watch_lock_ttl: config.watch_lock_ttl(),
        }
    }

    /// Connect using the store configuration.
    pub async fn connect(config: &StoreConfig, holder: AgentId) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| WaypointError::Store(format!("Failed to connect to store: {}", e)))?;

        Ok(Self::new(pool, holder, config))
    }

    /// Create the store tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("Membership store schema ready");
        Ok(())
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn try_acquire(&self, kind: LockKind, service: &ServiceName) -> Result<bool> {
        let ttl = match kind {
            LockKind::Fetch => Some(self.fetch_lock_ttl),
            LockKind::Watch => self.watch_lock_ttl,
        };

        let acquired: Option<(uuid::Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO waypoint_locks (service, kind, holder, acquired_at, lease_until)
            VALUES ($1, $2, $3, NOW(), NOW() + make_interval(secs => $4))
            ON CONFLICT (service, kind) DO UPDATE SET
                holder = EXCLUDED.holder,
                acquired_at = NOW(),
                lease_until = EXCLUDED.lease_until
            WHERE waypoint_locks.lease_until IS NOT NULL
              AND waypoint_locks.lease_until < NOW()
            RETURNING holder
            "#,
        )
        .bind(service.as_str())
        .bind(kind.as_str())
        .bind(self.holder.as_uuid())
        .bind(ttl.map(|ttl| ttl.as_secs_f64()))
        .fetch_optional(&self.pool)
        .await?;

        if acquired.is_some() {
            tracing::debug!(
                service = %service,
                lock = kind.as_str(),
                holder = %self.holder,
                "Lock acquired"
            );
        }

        Ok(acquired.is_some())
    }
}

impl MembershipStore for PgMembershipStore {
    fn try_acquire_fetch_lock<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.try_acquire(LockKind::Fetch, service))
    }

    fn try_acquire_watch_lock<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.try_acquire(LockKind::Watch, service))
    }

    fn get_membership<'a>(
        &'a self,
        service: &'a ServiceName,
    ) -> BoxFuture<'a, Result<Option<MembershipSet>>> {
        Box::pin(async move {
            let row: Option<(Json<MembershipSet>,)> =
                sqlx::query_as("SELECT endpoints FROM waypoint_memberships WHERE service = $1")
                    .bind(service.as_str())
                    .fetch_optional(&self.pool)
                    .await?;

            Ok(row.map(|(Json(members),)| members))
        })
    }

    fn set_membership<'a>(
        &'a self,
        service: &'a ServiceName,
        members: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO waypoint_memberships (service, endpoints, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (service) DO UPDATE SET
                    endpoints = EXCLUDED.endpoints,
                    updated_at = NOW()
                "#,
            )
            .bind(service.as_str())
            .bind(Json(members))
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn get_watch_heartbeat<'a>(
        &'a self,
        service: &'a ServiceName,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>> {
        Box::pin(async move {
            let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
                "SELECT last_watch_at FROM waypoint_watch_heartbeats WHERE service = $1",
            )
            .bind(service.as_str())
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|(at,)| at))
        })
    }

    fn set_watch_heartbeat<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO waypoint_watch_heartbeats (service, last_watch_at)
                VALUES ($1, NOW())
                ON CONFLICT (service) DO UPDATE SET last_watch_at = NOW()
                "#,
            )
            .bind(service.as_str())
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn watch_heartbeat_age<'a>(
        &'a self,
        service: &'a ServiceName,
    ) -> BoxFuture<'a, Result<Option<chrono::Duration>>> {
        Box::pin(async move {
            // Measured on the database clock, the same one that wrote the heartbeat.
            let row: Option<(i64,)> = sqlx::query_as(
                r#"
                SELECT (EXTRACT(EPOCH FROM (NOW() - last_watch_at)) * 1000)::BIGINT
                FROM waypoint_watch_heartbeats
                WHERE service = $1
                "#,
            )
            .bind(service.as_str())
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|(age_ms,)| chrono::Duration::milliseconds(age_ms)))
        })
    }
}
