//! Request pipeline
//!
//! [`Pipeline`] ties the connection manager and the two engines together and
//! runs the paged-listing flow every service uses: normalise paging input,
//! borrow a connection, count and fetch under the query timeout, then build
//! the metadata.

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::context::RequestScope;
use crate::errors::{AppError, ErrorKind};
use crate::pagination::{Page, PageRequest, PaginationQuery, Paginator};
use crate::pool::{ConnectionManager, ConnectionStats, Connector, PgConnector, PoolConfig};
use crate::validation::Validator;
use config::{AppConfig, PaginationSettings};

/// One listable relation. Implementations own their SQL; the pipeline owns
/// connections, timeouts and paging.
#[async_trait]
pub trait PageSource<Conn: Send>: Send + Sync {
    type Item: Send;

    /// Number of rows matching the listing, ignoring paging
    async fn count(&self, conn: &mut Conn) -> Result<i64, sqlx::Error>;

    /// Rows for the page described by `query`
    async fn fetch(
        &self,
        conn: &mut Conn,
        query: &PaginationQuery,
    ) -> Result<Vec<Self::Item>, sqlx::Error>;
}

/// Shared request infrastructure for every service
pub struct Pipeline<C: Connector = PgConnector> {
    manager: ConnectionManager<C>,
    validator: Validator,
    paginator: Paginator,
}

impl<C: Connector> Clone for Pipeline<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            validator: self.validator,
            paginator: self.paginator.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("manager", &self.manager)
            .field("limits", &self.paginator.limits())
            .finish()
    }
}

impl Pipeline<PgConnector> {
    /// Validate `config`, open the Postgres pool and build the engines
    pub async fn connect(config: &AppConfig, scope: &RequestScope) -> Result<Self, AppError> {
        config
            .validate()
            .map_err(|e| AppError::wrap(e, ErrorKind::Internal, "invalid configuration"))?;

        let manager =
            ConnectionManager::open(&config.database, PoolConfig::from(&config.pool), scope).await?;
        let pipeline = Self::from_parts(manager, &config.pagination)?;

        info!(
            host = %config.database.host,
            database = %config.database.database,
            "Request pipeline ready"
        );
        Ok(pipeline)
    }
}

impl<C: Connector> Pipeline<C> {
    pub fn from_parts(
        manager: ConnectionManager<C>,
        pagination: &PaginationSettings,
    ) -> Result<Self, AppError> {
        let validator = Validator::new(pagination.max_limit);
        let paginator = Paginator::new(validator, pagination.default_limit, pagination.max_limit)?;

        Ok(Self {
            manager,
            validator,
            paginator,
        })
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn paginator(&self) -> &Paginator {
        &self.paginator
    }

    /// List one page of `source`. Paging input is normalised before any
    /// connection is borrowed, so bad input never touches the pool.
    pub async fn fetch_page<S>(
        &self,
        scope: &RequestScope,
        request: &PageRequest,
        source: &S,
    ) -> Result<Page<S::Item>, AppError>
    where
        S: PageSource<C::Connection>,
    {
        let query = self.paginator.parse_request(scope, request)?;

        let mut conn = self.manager.acquire(scope).await?;
        let bounded = scope.with_timeout(self.manager.config().query_timeout);

        // A query abandoned by timeout or cancellation leaves the session unusable
        let counted = bounded.run("count rows", source.count(&mut *conn)).await;
        let total = match counted {
            Ok(result) => result
                .map_err(|e| AppError::from_db(e, "count rows").with_request_id(scope.request_id()))?,
            Err(err) => {
                conn.discard();
                return Err(err);
            }
        };
        let fetched = bounded.run("fetch rows", source.fetch(&mut *conn, &query)).await;
        let items = match fetched {
            Ok(result) => result
                .map_err(|e| AppError::from_db(e, "fetch rows").with_request_id(scope.request_id()))?,
            Err(err) => {
                conn.discard();
                return Err(err);
            }
        };
        drop(conn);

        debug_log!(
            total,
            page = query.page,
            returned = items.len(),
            "Fetched page"
        );
        self.paginator.paginate(scope, items, total, &query)
    }

    pub async fn health_check(&self, scope: &RequestScope) -> Result<(), AppError> {
        self.manager.health_check(scope).await
    }

    pub fn stats(&self, scope: &RequestScope) -> ConnectionStats {
        self.manager.stats(scope)
    }

    /// Close the pool; further acquisitions fail
    pub fn shutdown(&self) {
        self.manager.close();
    }
}
