//! Field rules
//!
//! Pure checks over single values. Each returns the violated rule so the
//! engine can phrase a message for the field being checked.

use uuid::Uuid;

/// A single violated rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    /// Empty or whitespace-only
    Required,
    /// Character count outside the inclusive range
    Length { min: usize, max: usize },
    /// Not shaped like `local@domain.tld`
    InvalidEmail,
    /// Not lowercase alphanumerics separated by single hyphens
    InvalidSlug,
    /// Not one of the enumerated values
    NotAllowed { allowed: &'static [&'static str] },
    /// Referenced id is the nil UUID
    NilReference,
    /// Password lacks an upper-case letter, a lower-case letter or a digit
    WeakPassword,
    /// Below the smallest allowed number
    TooSmall { min: i64 },
    /// Outside the inclusive numeric range
    OutOfRange { min: i64, max: i64 },
}

impl RuleViolation {
    /// Human readable message for `field`
    pub fn describe(&self, field: &str) -> String {
        match self {
            RuleViolation::Required => format!("{} is required", field),
            RuleViolation::Length { min: 0, max } => {
                format!("{} must be at most {} characters", field, max)
            }
            RuleViolation::Length { min, max } => {
                format!("{} must be between {} and {} characters", field, min, max)
            }
            RuleViolation::InvalidEmail => format!("{} must be a valid email address", field),
            RuleViolation::InvalidSlug => format!(
                "{} may only contain lowercase letters, digits and single hyphens, and cannot start or end with a hyphen",
                field
            ),
            RuleViolation::NotAllowed { allowed } => {
                format!("{} must be one of: {}", field, allowed.join(", "))
            }
            RuleViolation::NilReference => format!("{} must reference an existing record", field),
            RuleViolation::WeakPassword => format!(
                "{} must contain an upper-case letter, a lower-case letter and a digit",
                field
            ),
            RuleViolation::TooSmall { min } => {
                format!("{} must be greater than or equal to {}", field, min)
            }
            RuleViolation::OutOfRange { min, max } => {
                format!("{} must be between {} and {}", field, min, max)
            }
        }
    }
}

pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt ignores input past 72 bytes
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Trimmed value, or `Required` when nothing is left
pub fn required(value: &str) -> Result<&str, RuleViolation> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RuleViolation::Required)
    } else {
        Ok(trimmed)
    }
}

/// Inclusive character-count bounds
pub fn length(value: &str, min: usize, max: usize) -> Result<(), RuleViolation> {
    let count = value.chars().count();
    if count < min || count > max {
        Err(RuleViolation::Length { min, max })
    } else {
        Ok(())
    }
}

/// `required` then `length`; an empty value only ever reports `Required`
pub fn required_length(value: &str, min: usize, max: usize) -> Result<(), RuleViolation> {
    length(required(value)?, min, max)
}

/// Bounds check for optional text; `None` always passes
pub fn optional_length(value: Option<&str>, max: usize) -> Result<(), RuleViolation> {
    match value {
        Some(text) => length(text.trim(), 0, max),
        None => Ok(()),
    }
}

pub fn email(value: &str) -> Result<(), RuleViolation> {
    length(value, 3, MAX_EMAIL_LENGTH)?;

    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let Some(domain) = parts.next() else {
        return Err(RuleViolation::InvalidEmail);
    };

    let local_ok = !local.is_empty()
        && local.len() <= 64
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-'".contains(c));

    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        && labels
            .last()
            .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));

    if local_ok && domain_ok {
        Ok(())
    } else {
        Err(RuleViolation::InvalidEmail)
    }
}

/// Lowercase alphanumerics joined by single hyphens
pub fn slug(value: &str) -> Result<(), RuleViolation> {
    let valid = !value.is_empty()
        && value
            .split('-')
            .all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            });

    if valid {
        Ok(())
    } else {
        Err(RuleViolation::InvalidSlug)
    }
}

pub fn one_of(value: &str, allowed: &'static [&'static str]) -> Result<(), RuleViolation> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(RuleViolation::NotAllowed { allowed })
    }
}

pub fn non_nil(id: &Uuid) -> Result<(), RuleViolation> {
    if id.is_nil() {
        Err(RuleViolation::NilReference)
    } else {
        Ok(())
    }
}

pub fn password_strength(value: &str) -> Result<(), RuleViolation> {
    length(value, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH)?;

    let has_upper = value.chars().any(|c| c.is_uppercase());
    let has_lower = value.chars().any(|c| c.is_lowercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());

    if has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(RuleViolation::WeakPassword)
    }
}

pub fn at_least(value: i64, min: i64) -> Result<(), RuleViolation> {
    if value < min {
        Err(RuleViolation::TooSmall { min })
    } else {
        Ok(())
    }
}

pub fn within(value: i64, min: i64, max: i64) -> Result<(), RuleViolation> {
    if value < min || value > max {
        Err(RuleViolation::OutOfRange { min, max })
    } else {
        Ok(())
    }
}
