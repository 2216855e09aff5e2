//! Integration tests against a real PostgreSQL server
//!
//! Skipped unless `DATABASE_URL` is set.

use std::time::Duration;

use blogcore::prelude::*;
use sqlx::postgres::{PgConnectOptions, PgConnection};

const SERIES_SIZE: i64 = 25;

fn connector() -> Option<PgConnector> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let options: PgConnectOptions = database_url
        .parse()
        .expect("DATABASE_URL must be a valid postgres URL");
    Some(PgConnector::from_options(options))
}

/// Pages over `generate_series(1, 25)`
struct SeriesListing;

#[async_trait]
impl PageSource<PgConnection> for SeriesListing {
    type Item = i32;

    async fn count(&self, conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM generate_series(1, $1::int)")
            .bind(SERIES_SIZE as i32)
            .fetch_one(&mut *conn)
            .await
    }

    async fn fetch(
        &self,
        conn: &mut PgConnection,
        query: &PaginationQuery,
    ) -> Result<Vec<i32>, sqlx::Error> {
        let sql = format!(
            "SELECT n FROM generate_series(1, $1::int) AS s(n) {} {}",
            query.order_by_sql(&["n"], "n"),
            query.limit_offset_sql()
        );
        sqlx::query_scalar(&sql)
            .bind(SERIES_SIZE as i32)
            .fetch_all(&mut *conn)
            .await
    }
}

async fn open_pipeline(scope: &RequestScope) -> Option<Pipeline> {
    let connector = connector()?;
    let manager = ConnectionManager::with_connector(connector, PoolConfig::default(), scope)
        .await
        .expect("Failed to connect to database");
    Some(Pipeline::from_parts(manager, &PaginationSettings::default()).unwrap())
}

#[tokio::test]
async fn test_open_and_health_check() {
    let scope = RequestScope::new().with_timeout(Duration::from_secs(10));
    let Some(pipeline) = open_pipeline(&scope).await else {
        return;
    };

    pipeline.health_check(&scope).await.unwrap();
    let stats = pipeline.stats(&scope);
    assert!(stats.open >= 1);
    assert_eq!(stats.in_use, 0);

    pipeline.shutdown();
}

#[tokio::test]
async fn test_fetch_page_from_postgres() {
    let scope = RequestScope::new().with_timeout(Duration::from_secs(10));
    let Some(pipeline) = open_pipeline(&scope).await else {
        return;
    };

    let request = PageRequest::new(3, 10).sorted_by("n", "asc");
    let page = pipeline
        .fetch_page(&scope, &request, &SeriesListing)
        .await
        .unwrap();

    assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
    assert_eq!(page.pagination.total, SERIES_SIZE);
    assert_eq!(page.pagination.total_pages, 3);
    assert!(!page.pagination.has_next);
    assert!(page.pagination.has_prev);

    pipeline.shutdown();
}

#[tokio::test]
async fn test_with_connection_classifies_driver_errors() {
    let scope = RequestScope::new().with_timeout(Duration::from_secs(10));
    let Some(pipeline) = open_pipeline(&scope).await else {
        return;
    };

    let err = pipeline
        .manager()
        .with_connection(&scope, "load missing row", |conn| {
            Box::pin(async move {
                sqlx::query_scalar::<_, i32>("SELECT 1 WHERE false")
                    .fetch_one(&mut *conn)
                    .await
            })
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    pipeline.shutdown();
}

#[tokio::test]
async fn test_unreachable_server_is_database_error() {
    if connector().is_none() {
        return;
    }

    // Nothing listens on port 1
    let config = DatabaseConfig {
        port: 1,
        ..DatabaseConfig::default()
    };
    let pool_config = PoolConfig {
        connect_timeout: Duration::from_secs(2),
        ..PoolConfig::default()
    };
    let scope = RequestScope::new();

    let err = ConnectionManager::open(&config, pool_config, &scope)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
    assert_eq!(err.message(), "failed to connect to database");
}
