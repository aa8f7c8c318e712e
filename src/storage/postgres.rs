//! PostgreSQL storage implementation.
//!
//! Serves both the site configuration tables and the append-only result
//! tables from one connection pool.
//!
//! ## Tables
//!
//! ```text
//! probe_sites          (id, url)
//! probe_regexes        (id, associated_site_id → probe_sites, regex_str)
//! probe_results        (id, associated_site_id, timestamp, up)
//! regex_probe_results  (id, associated_site_id, associated_regex_id, timestamp, found)
//! ```

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;
use crate::models::{DatabaseConfig, ProbeRecord, RegexRule, Site};
use crate::storage::{ConfigSource, ResultStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS probe_sites (
        id SERIAL PRIMARY KEY,
        url VARCHAR(4096) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS probe_regexes (
        id SERIAL PRIMARY KEY,
        associated_site_id INT NOT NULL REFERENCES probe_sites (id) ON DELETE CASCADE,
        regex_str VARCHAR(4096) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS probe_results (
        id SERIAL PRIMARY KEY,
        associated_site_id INT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        up BOOL NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS regex_probe_results (
        id SERIAL PRIMARY KEY,
        associated_site_id INT NOT NULL,
        associated_regex_id INT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        found BOOL NOT NULL
    )
    "#,
];

/// Open a connection pool for the configured database.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

/// Postgres-backed config source and result store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the config and result tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigSource for PgStore {
    async fn load_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query_as::<_, (i32, String)>(
            r#"
            SELECT id, url
            FROM probe_sites
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id, url)| Site { id, url }).collect())
    }

    async fn load_rules(&self, site_id: i32) -> Result<Vec<RegexRule>> {
        let rows = sqlx::query_as::<_, (i32, i32, String)>(
            r#"
            SELECT id, associated_site_id, regex_str
            FROM probe_regexes
            WHERE associated_site_id = $1
            ORDER BY id
            "#,
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, site_id, pattern)| RegexRule {
                id,
                site_id,
                pattern,
            })
            .collect())
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn persist(&self, record: &ProbeRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO probe_results (associated_site_id, timestamp, up)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(record.site_id)
        .bind(record.recorded_at)
        .bind(record.up)
        .execute(&mut *tx)
        .await?;

        for (regex_id, found) in &record.regex_results {
            sqlx::query(
                r#"
                INSERT INTO regex_probe_results
                    (associated_site_id, associated_regex_id, timestamp, found)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(record.site_id)
            .bind(*regex_id)
            .bind(record.recorded_at)
            .bind(*found)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
