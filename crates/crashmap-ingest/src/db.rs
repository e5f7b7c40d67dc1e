//! Database pool and schema provisioning

use crashmap_common::env;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Embedded schema: `incident` and `station` tables
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Default Postgres port when connecting from `DB_*` parts.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default maximum connections in the pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default connection acquire timeout in seconds.
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Schema migration failed: {0}")]
    Migrate(#[from] MigrateError),

    #[error("Database configuration error: {0}. Set DATABASE_URL or DB_HOST/DB_USER/DB_DATABASE.")]
    Config(String),
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub connect: PgConnectOptions,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DbConfig {
    /// `DATABASE_URL` wins; otherwise the connection is built from `DB_*` parts.
    pub fn from_env() -> DbResult<Self> {
        dotenvy::dotenv().ok();

        let connect = match env::optional("DATABASE_URL") {
            Some(url) => PgConnectOptions::from_str(&url)
                .map_err(|e| DbError::Config(format!("invalid DATABASE_URL: {}", e)))?,
            None => options_from_parts()?,
        };

        let max_connections = env::parse_or("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)
            .map_err(|e| DbError::Config(e.to_string()))?;
        let connect_timeout_secs =
            env::parse_or("DB_CONNECT_TIMEOUT", DEFAULT_DB_CONNECT_TIMEOUT_SECS)
                .map_err(|e| DbError::Config(e.to_string()))?;

        if max_connections == 0 {
            return Err(DbError::Config("DB_MAX_CONNECTIONS must be greater than 0".to_string()));
        }

        Ok(Self {
            connect,
            max_connections,
            connect_timeout_secs,
        })
    }
}

/// Credentials go through the typed builder, never a formatted URL, so
/// reserved characters in a password need no escaping.
fn options_from_parts() -> DbResult<PgConnectOptions> {
    let part = |key: &str| env::required(key).map_err(|e| DbError::Config(e.to_string()));

    let host = part("DB_HOST")?;
    let user = part("DB_USER")?;
    let database = part("DB_DATABASE")?;
    let port = env::parse_or("DB_PORT", DEFAULT_DB_PORT).map_err(|e| DbError::Config(e.to_string()))?;

    let options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&user)
        .database(&database);

    Ok(match env::optional("DB_PASSWORD") {
        Some(password) => options.password(&password),
        None => options,
    })
}

pub async fn create_pool(config: &DbConfig) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(config.connect.clone())
        .await?;

    tracing::info!(
        host = config.connect.get_host(),
        database = config.connect.get_database().unwrap_or_default(),
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Create the tables if they do not exist. Never drops data.
pub async fn provision(pool: &PgPool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    tracing::info!("Schema is up to date");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}
