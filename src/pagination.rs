//! Pagination engine
//!
//! Turns raw `(page, limit, sort_by, sort_dir)` input into a normalised
//! [`PaginationQuery`] and builds the [`PaginationMetadata`] returned next to
//! a page of results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::RequestScope;
use crate::errors::AppError;
use crate::validation::Validator;
use crate::validation::rules::RuleViolation;

const SORT_DIRECTIONS: &[&str] = &["asc", "desc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    /// Case-insensitive; an empty value means the default direction
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(SortDirection::default());
        }
        if value.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            let message = RuleViolation::NotAllowed {
                allowed: SORT_DIRECTIONS,
            }
            .describe("sort_dir");
            Err(AppError::validation_error("sort_dir", message))
        }
    }
}

/// Raw paging input as it arrives from a query string
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
    pub sort_by: String,
    pub sort_dir: String,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page,
            limit,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, sort_by: impl Into<String>, sort_dir: impl Into<String>) -> Self {
        self.sort_by = sort_by.into();
        self.sort_dir = sort_dir.into();
        self
    }
}

/// Normalised paging parameters; `offset == (page - 1) * limit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationQuery {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
    pub sort_by: String,
    pub sort_dir: SortDirection,
}

impl PaginationQuery {
    pub fn limit_offset_sql(&self) -> String {
        format!("LIMIT {} OFFSET {}", self.limit, self.offset)
    }

    /// `ORDER BY` clause. `sort_by` is only used when it is one of `allowed`;
    /// anything else sorts by `fallback`, so caller input never reaches SQL.
    pub fn order_by_sql(&self, allowed: &[&str], fallback: &str) -> String {
        let column = if allowed.contains(&self.sort_by.as_str()) {
            self.sort_by.as_str()
        } else {
            fallback
        };
        format!("ORDER BY {} {}", column, self.sort_dir.to_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMetadata {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
    #[serde(skip)]
    pub request_id: String,
    #[serde(skip)]
    pub processed_at: DateTime<Utc>,
}

/// One page of results with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMetadata,
}

#[derive(Debug, Clone)]
pub struct Paginator {
    validator: Validator,
    default_limit: i64,
    max_limit: i64,
}

impl Paginator {
    /// Fails unless `1 <= default_limit <= max_limit` and the validator
    /// accepts limits up to `max_limit`
    pub fn new(validator: Validator, default_limit: u32, max_limit: u32) -> Result<Self, AppError> {
        let default_limit = i64::from(default_limit);
        let max_limit = i64::from(max_limit);

        if default_limit < 1 {
            return Err(AppError::validation_error(
                "default_limit",
                "default_limit must be at least 1",
            ));
        }
        if max_limit < default_limit {
            return Err(AppError::validation_error(
                "max_limit",
                "max_limit must be greater than or equal to default_limit",
            ));
        }
        if validator.max_limit() < max_limit {
            return Err(AppError::validation_error(
                "max_limit",
                "max_limit exceeds the validator's limit",
            ));
        }

        Ok(Self {
            validator,
            default_limit,
            max_limit,
        })
    }

    /// `(default_limit, max_limit)`
    pub fn limits(&self) -> (i64, i64) {
        (self.default_limit, self.max_limit)
    }

    /// Default and clamp `page` and `limit`, parse `sort_dir`, validate,
    /// then derive the offset. Only an unknown `sort_dir` is rejected; other
    /// out-of-range input is corrected silently.
    pub fn parse_query(
        &self,
        scope: &RequestScope,
        page: i64,
        limit: i64,
        sort_by: &str,
        sort_dir: &str,
    ) -> Result<PaginationQuery, AppError> {
        scope.guard("parse pagination query")?;

        let page = if page <= 0 { 1 } else { page };
        let limit = self.normalize_limit(limit);
        let sort_dir = sort_dir
            .parse::<SortDirection>()
            .map_err(|e| e.with_request_id(scope.request_id()))?;

        self.validator.validate_pagination(scope, page, limit)?;

        let offset = page.saturating_sub(1).saturating_mul(limit).max(0);
        trace_log!(page, limit, offset, "Parsed pagination query");

        Ok(PaginationQuery {
            page,
            limit,
            offset,
            sort_by: sort_by.trim().to_string(),
            sort_dir,
        })
    }

    pub fn parse_request(
        &self,
        scope: &RequestScope,
        request: &PageRequest,
    ) -> Result<PaginationQuery, AppError> {
        self.parse_query(
            scope,
            request.page,
            request.limit,
            &request.sort_by,
            &request.sort_dir,
        )
    }

    /// Metadata for a result set of `total` rows. A negative total counts as
    /// empty and `total_pages` is never below 1.
    pub fn build_metadata(
        &self,
        scope: &RequestScope,
        total: i64,
        page: i64,
        limit: i64,
    ) -> Result<PaginationMetadata, AppError> {
        scope.guard("build pagination metadata")?;

        let total = total.max(0);
        let page = page.max(1);
        let limit = if limit <= 0 { self.default_limit } else { limit };

        let remainder = if total % limit == 0 { 0 } else { 1 };
        let total_pages = (total / limit + remainder).max(1);

        Ok(PaginationMetadata {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
            request_id: scope.request_id().to_string(),
            processed_at: Utc::now(),
        })
    }

    pub fn paginate<T>(
        &self,
        scope: &RequestScope,
        items: Vec<T>,
        total: i64,
        query: &PaginationQuery,
    ) -> Result<Page<T>, AppError> {
        let pagination = self.build_metadata(scope, total, query.page, query.limit)?;
        Ok(Page { items, pagination })
    }

    fn normalize_limit(&self, limit: i64) -> i64 {
        if limit <= 0 {
            self.default_limit
        } else {
            limit.min(self.max_limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn paginator() -> Paginator {
        Paginator::new(Validator::new(100), 10, 100).unwrap()
    }

    #[test]
    fn test_empty_input_uses_defaults() {
        let query = paginator()
            .parse_query(&RequestScope::new(), 0, 0, "", "")
            .unwrap();

        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 0);
        assert_eq!(query.sort_dir, SortDirection::Desc);
    }

    #[test]
    fn test_limit_above_max_is_clamped() {
        let query = paginator()
            .parse_query(&RequestScope::new(), 1, 200, "title", "desc")
            .unwrap();

        assert_eq!(query.limit, 100);
        assert_eq!(query.sort_by, "title");
    }

    #[test]
    fn test_unknown_sort_dir_is_rejected() {
        let scope = RequestScope::new().with_request_id("req-3");
        let err = paginator()
            .parse_query(&scope, 1, 10, "title", "invalid")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.details().len(), 1);
        assert!(err.details().contains_key("sort_dir"));
        assert_eq!(err.request_id(), Some("req-3"));
    }

    #[test]
    fn test_sort_dir_is_case_insensitive() {
        assert_eq!(" ASC ".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!("Desc".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert_eq!("".parse::<SortDirection>().unwrap(), SortDirection::Desc);
    }

    #[test]
    fn test_metadata_on_last_page() {
        let meta = paginator()
            .build_metadata(&RequestScope::new(), 25, 3, 10)
            .unwrap();

        assert_eq!(meta.total_pages, 3);
        assert!(!meta.has_next);
        assert!(meta.has_prev);
    }

    #[test]
    fn test_metadata_for_empty_result() {
        let meta = paginator()
            .build_metadata(&RequestScope::new(), 0, 1, 10)
            .unwrap();

        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next);
        assert!(!meta.has_prev);
    }

    #[test]
    fn test_metadata_wire_shape() {
        let meta = paginator()
            .build_metadata(&RequestScope::new(), 11, 1, 10)
            .unwrap();
        let json = serde_json::to_value(&meta).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "page": 1,
                "limit": 10,
                "total": 11,
                "total_pages": 2,
                "has_next": true,
                "has_prev": false,
            })
        );
    }

    #[test]
    fn test_offset_follows_page_and_limit() {
        let paginator = paginator();
        let scope = RequestScope::new();

        for page in 1..=20 {
            for limit in [1, 7, 10, 50, 100] {
                let query = paginator.parse_query(&scope, page, limit, "", "asc").unwrap();
                assert_eq!(query.offset, (page - 1) * limit);
            }
        }
    }

    #[test]
    fn test_out_of_range_input_is_normalised() {
        let paginator = paginator();
        let scope = RequestScope::new();

        for raw in [-1000, -1, 0] {
            let query = paginator.parse_query(&scope, raw, raw, "", "").unwrap();
            assert_eq!(query.page, 1);
            assert_eq!(query.limit, 10);
        }
        for raw in [101, 500, i64::MAX] {
            let query = paginator.parse_query(&scope, 1, raw, "", "").unwrap();
            assert_eq!(query.limit, 100);
        }
    }

    #[test]
    fn test_total_pages_properties() {
        let paginator = paginator();
        let scope = RequestScope::new();

        for total in 0..=120 {
            for limit in [1, 3, 10, 100] {
                for page in 1..=4 {
                    let meta = paginator.build_metadata(&scope, total, page, limit).unwrap();
                    let expected = ((total + limit - 1) / limit).max(1);
                    assert_eq!(meta.total_pages, expected);
                    assert_eq!(meta.has_next, page < expected);
                    assert_eq!(meta.has_prev, page > 1);
                }
            }
        }
    }

    #[test]
    fn test_cancelled_scope_does_no_work() {
        let scope = RequestScope::new();
        scope.cancel();

        let paginator = paginator();
        // sort_dir is invalid, but cancellation is observed first
        let err = paginator.parse_query(&scope, 1, 10, "", "sideways").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        let err = paginator.build_metadata(&scope, 10, 1, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_constructor_rejects_bad_limits() {
        assert!(Paginator::new(Validator::new(100), 0, 100).is_err());
        assert!(Paginator::new(Validator::new(100), 20, 10).is_err());
        assert!(Paginator::new(Validator::new(50), 10, 100).is_err());
        assert_eq!(paginator().limits(), (10, 100));
    }

    #[test]
    fn test_sql_fragments() {
        let query = paginator()
            .parse_query(&RequestScope::new(), 3, 20, "title", "asc")
            .unwrap();

        assert_eq!(query.limit_offset_sql(), "LIMIT 20 OFFSET 40");
        assert_eq!(
            query.order_by_sql(&["title", "created_at"], "created_at"),
            "ORDER BY title ASC"
        );
        assert_eq!(
            query.order_by_sql(&["created_at"], "created_at"),
            "ORDER BY created_at ASC"
        );
    }

    #[test]
    fn test_page_request_defaults_from_json() {
        let request: PageRequest = serde_json::from_str(r#"{"page": 2}"#).unwrap();
        assert_eq!(request, PageRequest::new(2, 0));

        let query = paginator()
            .parse_request(&RequestScope::new(), &request)
            .unwrap();
        assert_eq!(query.offset, 10);
    }

    #[test]
    fn test_paginate_wraps_items() {
        let paginator = paginator();
        let scope = RequestScope::new();
        let query = paginator.parse_query(&scope, 1, 2, "", "").unwrap();

        let page = paginator.paginate(&scope, vec!["a", "b"], 5, &query).unwrap();
        assert_eq!(page.items, ["a", "b"]);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.request_id, scope.request_id());
    }
}
