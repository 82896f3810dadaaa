//! PostgreSQL access for store tests.
//!
//! The database is never picked up implicitly: tests either pass a URL to
//! [`TestDatabase::from_url`] or opt in through `TEST_DATABASE_URL` with
//! [`TestDatabase::from_env`]. `DATABASE_URL` is never read here.

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::{Result, WaypointError};

/// Connection to the server that hosts per-test databases.
pub struct TestDatabase {
    pool: PgPool,
    url: String,
}

impl TestDatabase {
    /// Connect to the database at `url`.
    pub async fn from_url(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(4).connect(url).await?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Connect using `TEST_DATABASE_URL`.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var("TEST_DATABASE_URL").map_err(|_| {
            WaypointError::Store(
                "TEST_DATABASE_URL not set. Set it explicitly for store tests.".to_string(),
            )
        })?;
        Self::from_url(&url).await
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the database URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create a fresh database for one test.
    ///
    /// Names carry a UUID suffix so tests running in parallel never share tables.
    pub async fn isolated(&self, test_name: &str) -> Result<IsolatedTestDb> {
        let db_name = format!(
            "waypoint_test_{}_{}",
            sanitize_db_name(test_name),
            uuid::Uuid::new_v4().simple()
        );

        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&self.pool)
            .await?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&replace_db_name(&self.url, &db_name))
            .await?;

        Ok(IsolatedTestDb {
            pool,
            db_name,
            base_url: self.url.clone(),
        })
    }
}

/// A database that lives for a single test.
pub struct IsolatedTestDb {
    pool: PgPool,
    db_name: String,
    base_url: String,
}

impl IsolatedTestDb {
    /// Get the connection pool for this database.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the database name.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Run raw SQL, e.g. to age a lease or a heartbeat.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Drop the database.
    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await?;

        let _ = sqlx::query(&format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
            self.db_name
        ))
        .execute(&pool)
        .await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
            .execute(&pool)
            .await?;

        Ok(())
    }
}

fn sanitize_db_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(32)
        .collect()
}

/// Swap the database component of a connection URL, keeping any query string.
fn replace_db_name(url: &str, new_db: &str) -> String {
    let Some(idx) = url.rfind('/') else {
        return format!("{}/{}", url, new_db);
    };

    let base = &url[..=idx];
    match url[idx + 1..].find('?') {
        Some(query_idx) => format!("{}{}{}", base, new_db, &url[idx + 1 + query_idx..]),
        None => format!("{}{}", base, new_db),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_db_name() {
        assert_eq!(sanitize_db_name("lease_takeover"), "lease_takeover");
        assert_eq!(sanitize_db_name("store::lease-takeover"), "store__lease_takeover");
    }

    #[test]
    fn test_replace_db_name() {
        assert_eq!(
            replace_db_name("postgres://localhost/waypoint", "scratch"),
            "postgres://localhost/scratch"
        );
        assert_eq!(
            replace_db_name("postgres://app:secret@db:5432/waypoint?sslmode=disable", "scratch"),
            "postgres://app:secret@db:5432/scratch?sslmode=disable"
        );
    }

    #[tokio::test]
    async fn test_from_env_requires_explicit_url() {
        if std::env::var("TEST_DATABASE_URL").is_ok() {
            return;
        }
        assert!(matches!(
            TestDatabase::from_env().await,
            Err(WaypointError::Store(_))
        ));
    }
}
