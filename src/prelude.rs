//! Convenience re-exports for common blogcore usage
//!
//! ```rust
//! use blogcore::prelude::*;
//! ```

pub use crate::context::{CancelSignal, RequestScope};
pub use crate::core::{PageSource, Pipeline};
pub use crate::errors::{AppError, ErrorKind, FieldError};
pub use crate::models::{NewArticle, NewCategory, NewComment, NewUser};
pub use crate::pagination::{Page, PageRequest, PaginationMetadata, PaginationQuery, Paginator, SortDirection};
pub use crate::pool::{ConnectionManager, ConnectionStats, Connector, PgConnector, PoolConfig};
pub use crate::validation::Validator;

// Re-export centralized config
pub use config::{AppConfig, DatabaseConfig, PaginationSettings, PoolSettings};

// Common external dependencies
pub use async_trait::async_trait;
pub use sqlx;
pub use tokio;
