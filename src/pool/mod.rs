//! Pooled connection manager
//!
//! Owns the lifetime of the shared database connection pool: opening with a
//! connectivity check, reconfiguration, acquisition bounded by the caller's
//! scope, health checks, statistics and shutdown.

pub mod config;
pub mod connector;
pub mod manager;
pub mod stats;

pub use self::config::PoolConfig;
pub use connector::{Connector, PgConnector};
pub use manager::{ConnectionManager, PooledConnection};
pub use stats::ConnectionStats;
