//! Connection pool implementation
//!
//! The pool keeps a LIFO stack of idle connections guarded by a short-lived
//! std mutex, counts every open connection against `max_open_connections`,
//! and parks callers on a [`Notify`] when it is exhausted. Gauges are mirrored
//! into atomics so [`ConnectionManager::stats`] never takes the lock.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use config::DatabaseConfig;
use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{info, warn};

use super::config::PoolConfig;
use super::connector::{Connector, PgConnector};
use super::stats::{ConnectionStats, Eviction, PoolCounters};
use crate::context::RequestScope;
use crate::errors::{AppError, ErrorKind};

/// Upper bound for the two health-check round-trips
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

struct IdleConnection<T> {
    conn: T,
    created_at: Instant,
    idle_since: Instant,
}

impl<T> IdleConnection<T> {
    fn expiry(&self, now: Instant, config: &PoolConfig) -> Option<Eviction> {
        if now.duration_since(self.created_at) >= config.conn_max_lifetime {
            Some(Eviction::Lifetime)
        } else if now.duration_since(self.idle_since) >= config.conn_max_idle_time {
            Some(Eviction::IdleTime)
        } else {
            None
        }
    }
}

struct PoolState<T> {
    idle: VecDeque<IdleConnection<T>>,
    /// Idle + in use + currently connecting
    open: usize,
    in_use: usize,
    closed: bool,
}

enum Checkout<T> {
    Idle(IdleConnection<T>),
    Connect,
    Exhausted,
    Closed,
}

struct PoolInner<C: Connector> {
    connector: C,
    config: RwLock<PoolConfig>,
    state: Mutex<PoolState<C::Connection>>,
    released: Notify,
    counters: PoolCounters,
}

impl<C: Connector> PoolInner<C> {
    fn config(&self) -> PoolConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState<C::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PoolState<C::Connection>) {
        self.counters
            .publish(state.open, state.in_use, state.idle.len());
    }

    /// Remove expired and surplus idle connections. The caller drops the
    /// returned connections after releasing the state lock.
    fn evict(&self, state: &mut PoolState<C::Connection>, config: &PoolConfig) -> Vec<C::Connection> {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(state.idle.len());

        for entry in state.idle.drain(..) {
            match entry.expiry(now, config) {
                Some(reason) => {
                    self.counters.record_eviction(reason);
                    expired.push(entry.conn);
                }
                None => kept.push_back(entry),
            }
        }

        // Oldest idle connections go first
        while kept.len() > config.max_idle_connections as usize {
            if let Some(entry) = kept.pop_front() {
                self.counters.record_eviction(Eviction::MaxIdle);
                expired.push(entry.conn);
            }
        }

        state.idle = kept;
        state.open = state.open.saturating_sub(expired.len());
        if !expired.is_empty() {
            debug_log!("Evicted {} idle connections", expired.len());
        }
        expired
    }

    fn checkout(&self) -> Checkout<C::Connection> {
        let config = self.config();
        let mut state = self.lock_state();
        if state.closed {
            return Checkout::Closed;
        }

        let expired = self.evict(&mut state, &config);
        let step = if let Some(idle) = state.idle.pop_back() {
            state.in_use += 1;
            Checkout::Idle(idle)
        } else if state.open < config.max_open_connections as usize {
            state.open += 1;
            Checkout::Connect
        } else {
            Checkout::Exhausted
        };
        self.publish(&state);
        drop(state);
        drop(expired);
        step
    }

    fn release(&self, conn: C::Connection, created_at: Instant) {
        let config = self.config();
        let now = Instant::now();
        let mut state = self.lock_state();
        state.in_use = state.in_use.saturating_sub(1);

        let surplus = state.closed || state.open > config.max_open_connections as usize;
        let eviction = if surplus {
            None
        } else if now.duration_since(created_at) >= config.conn_max_lifetime {
            Some(Eviction::Lifetime)
        } else if state.idle.len() >= config.max_idle_connections as usize {
            Some(Eviction::MaxIdle)
        } else {
            None
        };

        let closing = if surplus || eviction.is_some() {
            if let Some(reason) = eviction {
                self.counters.record_eviction(reason);
            }
            state.open = state.open.saturating_sub(1);
            Some(conn)
        } else {
            state.idle.push_back(IdleConnection {
                conn,
                created_at,
                idle_since: now,
            });
            None
        };

        self.publish(&state);
        drop(state);
        trace_log!("Connection released, closed={}", closing.is_some());
        drop(closing);
        self.released.notify_one();
    }

    /// Give back a slot whose connection is gone (failed connect or discard)
    fn forget(&self, was_in_use: bool) {
        let mut state = self.lock_state();
        state.open = state.open.saturating_sub(1);
        if was_in_use {
            state.in_use = state.in_use.saturating_sub(1);
        }
        self.publish(&state);
        drop(state);
        self.released.notify_one();
    }
}

/// Reserved `open` slot while a new connection is being established.
/// Dropping it unfinished returns the slot.
struct PendingSlot<'a, C: Connector> {
    inner: &'a PoolInner<C>,
    armed: bool,
}

impl<C: Connector> PendingSlot<'_, C> {
    fn complete(mut self) {
        self.armed = false;
        let mut state = self.inner.lock_state();
        state.in_use += 1;
        self.inner.publish(&state);
    }
}

impl<C: Connector> Drop for PendingSlot<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.forget(false);
        }
    }
}

/// A connection borrowed from the pool, returned to it on drop
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    created_at: Instant,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connector> PooledConnection<C> {
    fn new(conn: C::Connection, created_at: Instant, pool: Arc<PoolInner<C>>) -> Self {
        Self {
            conn: Some(conn),
            created_at,
            pool,
        }
    }

    /// Age of the underlying physical connection
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Close a connection known to be broken instead of returning it
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.forget(true);
            drop(conn);
        }
    }
}

impl<C: Connector> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("age", &self.age())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("BUG: PooledConnection used after return to pool")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("BUG: PooledConnection used after return to pool")
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.created_at);
        }
    }
}

/// Shared handle to the connection pool. Clones refer to the same pool.
pub struct ConnectionManager<C: Connector = PgConnector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.inner.config())
            .field("stats", &self.inner.counters.snapshot())
            .finish()
    }
}

impl ConnectionManager<PgConnector> {
    /// Open a PostgreSQL pool and verify connectivity within
    /// `pool_config.connect_timeout`
    pub async fn open(
        db_config: &DatabaseConfig,
        pool_config: PoolConfig,
        scope: &RequestScope,
    ) -> Result<Self, AppError> {
        let connector = PgConnector::new(db_config)?;
        Self::with_connector(connector, pool_config, scope).await
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Build a pool without touching the database
    pub fn new(connector: C, config: PoolConfig) -> Result<Self, AppError> {
        config.validate()?;

        let counters = PoolCounters::default();
        counters.set_max_open(config.max_open_connections);

        Ok(Self {
            inner: Arc::new(PoolInner {
                connector,
                config: RwLock::new(config),
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    open: 0,
                    in_use: 0,
                    closed: false,
                }),
                released: Notify::new(),
                counters,
            }),
        })
    }

    /// Build a pool and ping the database once. On failure the pool is closed and a
    /// `Database` error returned; no half-initialised manager escapes.
    pub async fn with_connector(
        connector: C,
        config: PoolConfig,
        scope: &RequestScope,
    ) -> Result<Self, AppError> {
        scope.guard("open connection pool")?;

        let connect_scope = scope.with_timeout(config.connect_timeout);
        let manager = Self::new(connector, config)?;

        if let Err(err) = manager.verify_connectivity(&connect_scope).await {
            manager.close();
            scope.guard("open connection pool")?;
            warn!(error = %err, "Database connectivity check failed");
            return Err(AppError::wrap(err, ErrorKind::Database, "failed to connect to database")
                .with_request_id(scope.request_id()));
        }

        let config = manager.config();
        info!(
            max_open = config.max_open_connections,
            max_idle = config.max_idle_connections,
            "Connection pool opened"
        );
        Ok(manager)
    }

    async fn verify_connectivity(&self, scope: &RequestScope) -> Result<(), AppError> {
        let mut conn = self.acquire(scope).await?;
        let pinged = scope
            .run("ping database", self.inner.connector.ping(&mut *conn))
            .await;
        match pinged {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                conn.discard();
                Err(AppError::from_db(e, "ping database"))
            }
            Err(err) => {
                conn.discard();
                Err(err)
            }
        }
    }

    /// Last applied configuration
    pub fn config(&self) -> PoolConfig {
        self.inner.config()
    }

    /// Apply a new configuration snapshot. Reapplying the current one changes
    /// nothing.
    pub fn configure(&self, scope: &RequestScope, config: PoolConfig) -> Result<(), AppError> {
        scope.guard("configure connection pool")?;
        config.validate()?;

        {
            let mut current = self
                .inner
                .config
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if *current == config {
                return Ok(());
            }
            *current = config.clone();
        }
        self.inner.counters.set_max_open(config.max_open_connections);

        let expired = {
            let mut state = self.inner.lock_state();
            let expired = self.inner.evict(&mut state, &config);
            self.inner.publish(&state);
            expired
        };
        drop(expired);

        // A larger max_open may unblock waiters
        self.inner.released.notify_waiters();
        info!(
            max_open = config.max_open_connections,
            max_idle = config.max_idle_connections,
            "Connection pool reconfigured"
        );
        Ok(())
    }

    /// Borrow a connection, waiting for one to be released when the pool is
    /// exhausted. An already-done scope never reaches the driver. Failures
    /// are not retried.
    pub async fn acquire(&self, scope: &RequestScope) -> Result<PooledConnection<C>, AppError> {
        scope.guard("acquire connection")?;
        let mut wait_started: Option<Instant> = None;

        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed
            released.as_mut().enable();

            match self.inner.checkout() {
                Checkout::Idle(idle) => {
                    self.finish_wait(wait_started);
                    trace_log!("Reusing idle connection");
                    return Ok(PooledConnection::new(
                        idle.conn,
                        idle.created_at,
                        Arc::clone(&self.inner),
                    ));
                }
                Checkout::Connect => {
                    self.finish_wait(wait_started);
                    return self.connect(scope).await;
                }
                Checkout::Exhausted => {
                    if wait_started.is_none() {
                        wait_started = Some(Instant::now());
                        self.inner.counters.record_wait_start();
                        debug_log!("Connection pool exhausted, waiting");
                    }
                    if let Err(err) = scope.run("acquire connection", released).await {
                        self.finish_wait(wait_started);
                        return Err(err);
                    }
                }
                Checkout::Closed => {
                    self.finish_wait(wait_started);
                    return Err(AppError::new(ErrorKind::Database, "connection pool is closed")
                        .with_request_id(scope.request_id()));
                }
            }
        }
    }

    fn finish_wait(&self, wait_started: Option<Instant>) {
        if let Some(started) = wait_started {
            self.inner.counters.record_wait(started.elapsed());
        }
    }

    async fn connect(&self, scope: &RequestScope) -> Result<PooledConnection<C>, AppError> {
        let slot = PendingSlot {
            inner: &self.inner,
            armed: true,
        };
        let bounded = scope.with_timeout(self.inner.config().connect_timeout);

        let conn = bounded
            .run("open database connection", self.inner.connector.connect())
            .await?
            .map_err(|e| {
                AppError::wrap(e, ErrorKind::Database, "failed to open database connection")
                    .with_request_id(scope.request_id())
            })?;

        slot.complete();
        debug_log!("Opened new database connection");
        Ok(PooledConnection::new(conn, Instant::now(), Arc::clone(&self.inner)))
    }

    /// Acquire a connection and run `f` on it, bounded by `query_timeout`
    /// and the caller's scope
    pub async fn with_connection<T, F>(
        &self,
        scope: &RequestScope,
        operation: &str,
        f: F,
    ) -> Result<T, AppError>
    where
        F: for<'c> FnOnce(&'c mut C::Connection) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        let mut conn = self.acquire(scope).await?;
        let bounded = scope.with_timeout(self.inner.config().query_timeout);
        let outcome = bounded.run(operation, f(&mut *conn)).await;
        match outcome {
            Ok(result) => result
                .map_err(|e| AppError::from_db(e, operation).with_request_id(scope.request_id())),
            Err(err) => {
                // Abandoned mid-query; the session state is unknown
                conn.discard();
                Err(err)
            }
        }
    }

    /// Ping, run a trivial query, then confirm the pool reports an open
    /// connection. Driver failures come back as `Database` errors carrying
    /// the failed stage in `details["stage"]`.
    pub async fn health_check(&self, scope: &RequestScope) -> Result<(), AppError> {
        scope.guard("health check")?;
        let bounded = scope.with_timeout(HEALTH_CHECK_TIMEOUT);

        let mut conn = self
            .acquire(&bounded)
            .await
            .map_err(|e| self.stage_failure(scope, "acquire", e))?;

        let pinged = bounded
            .run("health check ping", self.inner.connector.ping(&mut *conn))
            .await;
        if let Err(err) = self.stage_result(scope, "ping", pinged) {
            conn.discard();
            return Err(err);
        }

        let queried = bounded
            .run("health check query", self.inner.connector.round_trip(&mut *conn))
            .await;
        if let Err(err) = self.stage_result(scope, "query", queried) {
            conn.discard();
            return Err(err);
        }

        // Read while the connection is still borrowed: it counts as open, so
        // this stage only trips when the counters have drifted. Reading after
        // release would fail whenever release closes it (max_idle 0, expired).
        let stats = self.stats(scope);
        drop(conn);
        if stats.open == 0 {
            return Err(self.stage_failure(
                scope,
                "stats",
                AppError::internal("pool reports no open connections"),
            ));
        }
        Ok(())
    }

    fn stage_result(
        &self,
        scope: &RequestScope,
        stage: &str,
        result: Result<Result<(), sqlx::Error>, AppError>,
    ) -> Result<(), AppError> {
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(self.stage_failure(scope, stage, err)),
            Err(err) => Err(self.stage_failure(scope, stage, err)),
        }
    }

    fn stage_failure<E>(&self, scope: &RequestScope, stage: &str, err: E) -> AppError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        // The caller's own cancellation or deadline outranks the stage failure
        if let Err(done) = scope.guard("health check") {
            return done;
        }
        warn!(stage, error = %err, "Database health check failed");
        AppError::wrap(
            err,
            ErrorKind::Database,
            format!("database health check failed at {} stage", stage),
        )
        .with_detail("stage", stage)
        .with_request_id(scope.request_id())
    }

    /// Best-effort snapshot; a done scope gets the zero value
    pub fn stats(&self, scope: &RequestScope) -> ConnectionStats {
        if scope.is_done() {
            return ConnectionStats::default();
        }
        self.inner.counters.snapshot()
    }

    /// Close every idle connection and refuse further acquisitions.
    /// Connections still borrowed are closed when returned. Idempotent.
    pub fn close(&self) {
        let drained: Vec<C::Connection> = {
            let mut state = self.inner.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).map(|entry| entry.conn).collect();
            state.open = state.open.saturating_sub(drained.len());
            self.inner.publish(&state);
            drained
        };

        let closed_idle = drained.len();
        drop(drained);
        self.inner.released.notify_waiters();
        info!(closed_idle, "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().closed
    }
}
