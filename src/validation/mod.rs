//! Validation engine
//!
//! Checks domain inputs field by field and reports every violation in one
//! `Validation` [`AppError`]. Each operation checks the request scope first
//! and again around its expensive rule groups, so a cancelled request stops
//! evaluating rules promptly.

pub mod rules;

use uuid::Uuid;

use crate::context::RequestScope;
use crate::errors::{AppError, FieldError};
use crate::models::{ARTICLE_STATUSES, NewArticle, NewCategory, NewComment, NewUser, USER_ROLES};
use rules::RuleViolation;

/// Offending values longer than this are cut in reports
const MAX_REPORTED_VALUE: usize = 64;

/// Ordered collection of violations for one validation call
struct Report<'a> {
    scope: &'a RequestScope,
    violations: Vec<FieldError>,
}

impl<'a> Report<'a> {
    fn new(scope: &'a RequestScope) -> Self {
        Self {
            scope,
            violations: Vec::new(),
        }
    }

    fn check(&mut self, field: &str, value: &str, result: Result<(), RuleViolation>) {
        if let Err(violation) = result {
            let error = FieldError::new(field, violation.describe(field))
                .with_value(reported_value(value))
                .with_request_id(Some(self.scope.request_id()));
            self.violations.push(error);
        }
    }

    /// Like `check`, but the value is never copied into the report
    fn check_secret(&mut self, field: &str, result: Result<(), RuleViolation>) {
        if let Err(violation) = result {
            let error = FieldError::new(field, violation.describe(field))
                .with_request_id(Some(self.scope.request_id()));
            self.violations.push(error);
        }
    }

    fn check_id(&mut self, field: &str, id: &Uuid) {
        self.check(field, &id.to_string(), rules::non_nil(id));
    }

    fn finish(self) -> Result<(), AppError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(AppError::from_field_errors(self.violations))
        }
    }
}

fn reported_value(value: &str) -> String {
    if value.chars().count() <= MAX_REPORTED_VALUE {
        value.to_string()
    } else {
        let mut cut: String = value.chars().take(MAX_REPORTED_VALUE).collect();
        cut.push('…');
        cut
    }
}

/// Stateless validator; `max_limit` bounds the pagination rule
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_limit: i64,
}

impl Validator {
    pub fn new(max_limit: u32) -> Self {
        Self {
            max_limit: i64::from(max_limit),
        }
    }

    pub fn max_limit(&self) -> i64 {
        self.max_limit
    }

    pub fn validate_user(&self, scope: &RequestScope, user: &NewUser) -> Result<(), AppError> {
        const OP: &str = "validate user";
        scope.guard(OP)?;

        let mut report = Report::new(scope);
        report.check("name", &user.name, rules::required_length(&user.name, 2, 100));
        report.check(
            "email",
            &user.email,
            rules::required(&user.email).and_then(rules::email),
        );
        report.check(
            "role",
            &user.role,
            rules::required(&user.role).and_then(|role| rules::one_of(role, USER_ROLES)),
        );

        scope.guard(OP)?;
        report.check_secret(
            "password",
            rules::required(&user.password).and_then(rules::password_strength),
        );
        scope.guard(OP)?;

        report.finish()
    }

    pub fn validate_article(&self, scope: &RequestScope, article: &NewArticle) -> Result<(), AppError> {
        const OP: &str = "validate article";
        scope.guard(OP)?;

        let mut report = Report::new(scope);
        report.check("title", &article.title, rules::required_length(&article.title, 3, 200));
        report.check(
            "slug",
            &article.slug,
            rules::required(&article.slug).and_then(|slug| {
                rules::length(slug, 1, 200)?;
                rules::slug(slug)
            }),
        );
        report.check(
            "status",
            &article.status,
            rules::required(&article.status).and_then(|status| rules::one_of(status, ARTICLE_STATUSES)),
        );
        report.check_id("author_id", &article.author_id);
        if let Some(category_id) = &article.category_id {
            report.check_id("category_id", category_id);
        }

        // Body text can be large
        scope.guard(OP)?;
        report.check(
            "content",
            &article.content,
            rules::required_length(&article.content, 10, 50_000),
        );
        if let Some(excerpt) = &article.excerpt {
            report.check("excerpt", excerpt, rules::optional_length(Some(excerpt), 500));
        }
        scope.guard(OP)?;

        report.finish()
    }

    pub fn validate_comment(&self, scope: &RequestScope, comment: &NewComment) -> Result<(), AppError> {
        const OP: &str = "validate comment";
        scope.guard(OP)?;

        let mut report = Report::new(scope);
        report.check("content", &comment.content, rules::required_length(&comment.content, 1, 2_000));
        report.check_id("article_id", &comment.article_id);
        report.check_id("user_id", &comment.user_id);
        if let Some(parent_id) = &comment.parent_id {
            report.check_id("parent_id", parent_id);
        }
        scope.guard(OP)?;

        report.finish()
    }

    pub fn validate_category(&self, scope: &RequestScope, category: &NewCategory) -> Result<(), AppError> {
        const OP: &str = "validate category";
        scope.guard(OP)?;

        let mut report = Report::new(scope);
        report.check("name", &category.name, rules::required_length(&category.name, 2, 100));
        report.check(
            "slug",
            &category.slug,
            rules::required(&category.slug).and_then(|slug| {
                rules::length(slug, 1, 100)?;
                rules::slug(slug)
            }),
        );
        if let Some(description) = &category.description {
            report.check(
                "description",
                description,
                rules::optional_length(Some(description), 500),
            );
        }
        scope.guard(OP)?;

        report.finish()
    }

    /// `page >= 1` and `1 <= limit <= max_limit`
    pub fn validate_pagination(&self, scope: &RequestScope, page: i64, limit: i64) -> Result<(), AppError> {
        scope.guard("validate pagination")?;

        let mut report = Report::new(scope);
        report.check("page", &page.to_string(), rules::at_least(page, 1));
        report.check("limit", &limit.to_string(), rules::within(limit, 1, self.max_limit));
        report.finish()
    }
}
