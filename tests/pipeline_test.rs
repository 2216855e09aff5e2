//! Integration tests for the request pipeline
//!
//! Runs the full paged-listing flow against an in-memory connector so no
//! database is needed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use blogcore::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct ArticleRow {
    title: String,
}

#[derive(Clone)]
struct MemoryConnector {
    rows: Arc<Vec<ArticleRow>>,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    fn with_articles(count: usize) -> Self {
        let rows = (0..count)
            .map(|i| ArticleRow {
                title: format!("article-{:03}", i),
            })
            .collect();
        Self {
            rows: Arc::new(rows),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

struct MemoryConnection {
    rows: Arc<Vec<ArticleRow>>,
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, sqlx::Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            rows: Arc::clone(&self.rows),
        })
    }

    async fn ping(&self, _conn: &mut MemoryConnection) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn round_trip(&self, _conn: &mut MemoryConnection) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

/// Lists articles ordered by title
struct ArticleListing;

#[async_trait]
impl PageSource<MemoryConnection> for ArticleListing {
    type Item = ArticleRow;

    async fn count(&self, conn: &mut MemoryConnection) -> Result<i64, sqlx::Error> {
        Ok(conn.rows.len() as i64)
    }

    async fn fetch(
        &self,
        conn: &mut MemoryConnection,
        query: &PaginationQuery,
    ) -> Result<Vec<ArticleRow>, sqlx::Error> {
        let mut rows: Vec<ArticleRow> = conn.rows.as_ref().clone();
        if query.sort_dir == SortDirection::Desc {
            rows.reverse();
        }
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }
}

/// Never answers in time
struct StalledListing;

#[async_trait]
impl PageSource<MemoryConnection> for StalledListing {
    type Item = ArticleRow;

    async fn count(&self, _conn: &mut MemoryConnection) -> Result<i64, sqlx::Error> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(0)
    }

    async fn fetch(
        &self,
        _conn: &mut MemoryConnection,
        _query: &PaginationQuery,
    ) -> Result<Vec<ArticleRow>, sqlx::Error> {
        Ok(Vec::new())
    }
}

/// Count fails the way a missing row does
struct MissingListing;

#[async_trait]
impl PageSource<MemoryConnection> for MissingListing {
    type Item = ArticleRow;

    async fn count(&self, _conn: &mut MemoryConnection) -> Result<i64, sqlx::Error> {
        Err(sqlx::Error::RowNotFound)
    }

    async fn fetch(
        &self,
        _conn: &mut MemoryConnection,
        _query: &PaginationQuery,
    ) -> Result<Vec<ArticleRow>, sqlx::Error> {
        Ok(Vec::new())
    }
}

fn pipeline_with(connector: MemoryConnector, config: PoolConfig) -> Pipeline<MemoryConnector> {
    let manager = ConnectionManager::new(connector, config).unwrap();
    Pipeline::from_parts(manager, &PaginationSettings::default()).unwrap()
}

fn pipeline(connector: MemoryConnector) -> Pipeline<MemoryConnector> {
    pipeline_with(connector, PoolConfig::default())
}

#[tokio::test]
async fn test_fetch_middle_page() {
    let connector = MemoryConnector::with_articles(25);
    let pipeline = pipeline(connector.clone());
    let scope = RequestScope::new().with_request_id("req-list");

    let request = PageRequest::new(2, 10).sorted_by("title", "asc");
    let page = pipeline
        .fetch_page(&scope, &request, &ArticleListing)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 10);
    assert_eq!(page.items[0].title, "article-010");
    assert_eq!(page.pagination.total, 25);
    assert_eq!(page.pagination.total_pages, 3);
    assert!(page.pagination.has_next);
    assert!(page.pagination.has_prev);
    assert_eq!(page.pagination.request_id, "req-list");

    // The connection went back to the pool
    let stats = pipeline.stats(&scope);
    assert_eq!((stats.open, stats.in_use, stats.idle), (1, 0, 1));
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_defaults_apply_to_empty_request() {
    let pipeline = pipeline(MemoryConnector::with_articles(3));
    let scope = RequestScope::new();

    let page = pipeline
        .fetch_page(&scope, &PageRequest::default(), &ArticleListing)
        .await
        .unwrap();

    // Default direction is descending
    assert_eq!(page.items[0].title, "article-002");
    assert_eq!(page.pagination.limit, 10);
    assert_eq!(page.pagination.total_pages, 1);
    assert!(!page.pagination.has_next);
    assert!(!page.pagination.has_prev);
}

#[tokio::test]
async fn test_bad_sort_dir_never_touches_pool() {
    let connector = MemoryConnector::with_articles(5);
    let pipeline = pipeline(connector.clone());

    let request = PageRequest::new(1, 10).sorted_by("title", "sideways");
    let err = pipeline
        .fetch_page(&RequestScope::new(), &request, &ArticleListing)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.details().contains_key("sort_dir"));
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_cancelled_request_does_nothing() {
    let connector = MemoryConnector::with_articles(5);
    let pipeline = pipeline(connector.clone());
    let scope = RequestScope::new();
    scope.cancel();

    let err = pipeline
        .fetch_page(&scope, &PageRequest::default(), &ArticleListing)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!err.is_retryable());
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_slow_query_hits_query_timeout() {
    let config = PoolConfig {
        query_timeout: Duration::from_millis(20),
        ..PoolConfig::default()
    };
    let connector = MemoryConnector::with_articles(5);
    let pipeline = pipeline_with(connector.clone(), config);
    let scope = RequestScope::new();

    let err = pipeline
        .fetch_page(&scope, &PageRequest::default(), &StalledListing)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_retryable());
    assert_eq!(err.request_id(), Some(scope.request_id()));

    // The abandoned connection is not handed to the next request
    let stats = pipeline.stats(&scope);
    assert_eq!((stats.open, stats.in_use, stats.idle), (0, 0, 0));

    pipeline
        .fetch_page(&scope, &PageRequest::default(), &ArticleListing)
        .await
        .unwrap();
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn test_driver_errors_are_classified() {
    let pipeline = pipeline(MemoryConnector::with_articles(5));
    let scope = RequestScope::new().with_request_id("req-missing");

    let err = pipeline
        .fetch_page(&scope, &PageRequest::default(), &MissingListing)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status_hint(), 404);
    assert_eq!(err.request_id(), Some("req-missing"));
}

#[tokio::test]
async fn test_health_check_then_shutdown() {
    let pipeline = pipeline(MemoryConnector::with_articles(1));
    let scope = RequestScope::new();

    pipeline.health_check(&scope).await.unwrap();

    pipeline.shutdown();
    assert!(pipeline.manager().is_closed());

    let err = pipeline.health_check(&scope).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
    assert_eq!(err.details()["stage"], "acquire");

    let err = pipeline
        .fetch_page(&scope, &PageRequest::default(), &ArticleListing)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
    assert_eq!(err.message(), "connection pool is closed");
}

#[tokio::test]
async fn test_validation_through_pipeline() {
    let pipeline = pipeline(MemoryConnector::with_articles(0));
    let scope = RequestScope::new().with_request_id("req-signup");

    let user = NewUser {
        name: String::new(),
        email: "nobody".to_string(),
        password: "Sup3rsecret".to_string(),
        role: "user".to_string(),
    };
    let err = pipeline.validator().validate_user(&scope, &user).unwrap_err();

    let response = serde_json::to_value(err.to_response()).unwrap();
    assert_eq!(response["success"], false);
    assert_eq!(response["error"]["code"], "VALIDATION");
    assert_eq!(response["error"]["request_id"], "req-signup");
    assert!(response["error"]["details"]["name"].is_string());
    assert!(response["error"]["details"]["email"].is_string());
}
