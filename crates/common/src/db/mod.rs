//! Database layer for Imole
//!
//! Provides:
//! - SeaORM entity for `legal_cases`
//! - Repository over PostgreSQL + pgvector
//! - The `CaseStore` seam used by retrieval, with an in-memory implementation
//! - Connection pool management and bundled migrations

pub mod models;
mod repository;
mod store;

pub use repository::Repository;
pub use store::{cosine_similarity, CaseMatch, CaseStore, InMemoryCaseStore};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{DatabaseConnection, SqlxPostgresConnector};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
///
/// Raw pgvector statements go through the sqlx pool; entity queries go
/// through the SeaORM connection built on the same pool.
#[derive(Clone)]
pub struct DbPool {
    pool: PgPool,
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(host = %config.host, database = %config.name, "Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect_with(connect_options(config)?)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to {}: {}", config.host, e),
            })?;

        let conn = SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());

        info!("Database connection established");

        Ok(Self { pool, conn })
    }

    /// sqlx pool for raw statements
    pub fn pg(&self) -> &PgPool {
        &self.pool
    }

    /// SeaORM connection for entity queries
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }

    /// Apply bundled migrations (pgvector extension + `legal_cases`)
    pub async fn migrate(&self) -> Result<()> {
        info!("Applying database migrations...");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Build sqlx connect options from discrete host/port/name/user/password settings
pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let ssl_mode = PgSslMode::from_str(&config.ssl_mode).map_err(|e| AppError::Configuration {
        message: format!("Invalid database.ssl_mode {:?}: {}", config.ssl_mode, e),
    })?;

    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.name)
        .username(&config.user)
        .ssl_mode(ssl_mode);

    if let Some(password) = &config.password {
        options = options.password(password);
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_connect_options_from_config() {
        let mut config = AppConfig::default().database;
        config.host = "db.example.com".to_string();
        config.port = 25060;
        config.name = "cases".to_string();

        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.example.com");
        assert_eq!(options.get_port(), 25060);
        assert_eq!(options.get_database(), Some("cases"));
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = AppConfig::default().database;
        config.ssl_mode = "sometimes".to_string();
        assert!(matches!(
            connect_options(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
