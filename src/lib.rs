//! # blogcore
//!
//! Request infrastructure shared by every service of the blog backend: a
//! pooled connection manager, a validation engine, a pagination engine and a
//! single error taxonomy. Every operation takes a [`RequestScope`] carrying
//! the request's correlation ids, deadline and cancellation signal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blogcore::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let scope = RequestScope::new().with_timeout(std::time::Duration::from_secs(5));
//!
//!     let pipeline = Pipeline::connect(&config, &scope).await?;
//!     pipeline.health_check(&scope).await?;
//!
//!     let query = pipeline.paginator().parse_query(&scope, 2, 20, "created_at", "desc")?;
//!     println!("{} {}", query.order_by_sql(&["created_at"], "created_at"), query.limit_offset_sql());
//!
//!     pipeline.shutdown();
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod context;
pub mod core;
pub mod errors;
pub mod models;
pub mod pagination;
pub mod pool;
pub mod prelude;
pub mod validation;

// Re-export the main public types for convenience
pub use context::{CancelSignal, RequestScope};
pub use self::core::{PageSource, Pipeline};
pub use errors::{AppError, ErrorKind, ErrorResponse, FieldError};
pub use pagination::{Page, PageRequest, PaginationMetadata, PaginationQuery, Paginator, SortDirection};
pub use pool::{ConnectionManager, ConnectionStats, Connector, PgConnector, PoolConfig, PooledConnection};
pub use validation::Validator;

// Re-export centralized config
pub use config::{AppConfig, ConfigError, DatabaseConfig, PaginationSettings, PoolSettings};

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;
