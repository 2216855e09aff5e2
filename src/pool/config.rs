use std::time::Duration;

use config::PoolSettings;

use crate::errors::{AppError, FieldError};

/// Immutable pool tuning snapshot, replaced wholesale on reconfiguration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_open_connections: u32,
    pub max_idle_connections: u32,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
}

impl PoolConfig {
    /// Check every constraint, reporting all offending fields at once
    pub fn validate(&self) -> Result<(), AppError> {
        let mut violations = Vec::new();

        if self.max_open_connections == 0 {
            violations.push(FieldError::new(
                "max_open_connections",
                "max_open_connections must be greater than 0",
            ));
        }
        let durations = [
            ("conn_max_lifetime", self.conn_max_lifetime),
            ("conn_max_idle_time", self.conn_max_idle_time),
            ("connect_timeout", self.connect_timeout),
            ("query_timeout", self.query_timeout),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                violations.push(FieldError::new(field, format!("{} must be greater than 0", field)));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(AppError::from_field_errors(violations))
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&PoolSettings::default())
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            max_open_connections: settings.max_open_connections,
            max_idle_connections: settings.max_idle_connections,
            conn_max_lifetime: Duration::from_secs(settings.conn_max_lifetime_seconds),
            conn_max_idle_time: Duration::from_secs(settings.conn_max_idle_time_seconds),
            connect_timeout: Duration::from_secs(settings.connect_timeout_seconds),
            query_timeout: Duration::from_secs(settings.query_timeout_seconds),
        }
    }
}
