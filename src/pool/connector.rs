//! Driver seam for the connection pool
//!
//! The pool never talks to the database directly; it asks a [`Connector`]
//! to open connections and check them with a ping or a round trip.
//! [`PgConnector`] is the PostgreSQL implementation backed by sqlx.

use std::str::FromStr;

use async_trait::async_trait;
use config::DatabaseConfig;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;

use crate::errors::{AppError, ErrorKind};

/// Connection factory used by [`ConnectionManager`](super::ConnectionManager)
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new physical connection
    async fn connect(&self) -> Result<Self::Connection, sqlx::Error>;

    /// Cheap liveness check on an open connection
    async fn ping(&self, conn: &mut Self::Connection) -> Result<(), sqlx::Error>;

    /// Trivial query round-trip (`SELECT 1`)
    async fn round_trip(&self, conn: &mut Self::Connection) -> Result<(), sqlx::Error>;
}

/// PostgreSQL connector
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    /// Options are set field by field, so credentials never pass through a URL
    pub fn new(config: &DatabaseConfig) -> Result<Self, AppError> {
        let ssl_mode = PgSslMode::from_str(config.ssl_mode.trim())
            .map_err(|e| AppError::wrap(e, ErrorKind::Database, "invalid database connection settings"))?;

        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .database(&config.database)
            .ssl_mode(ssl_mode);
        // An empty password leaves PGPASSWORD or .pgpass in charge
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        Ok(Self { options })
    }

    pub fn from_options(options: PgConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgConnection;

    async fn connect(&self) -> Result<PgConnection, sqlx::Error> {
        PgConnection::connect_with(&self.options).await
    }

    async fn ping(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        conn.ping().await
    }

    async fn round_trip(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }
}
