//! Environment-driven configuration for a worker instance, loaded the same
//! way `database::postgres::PostgresConfig` and `core_config::ServerConfig`
//! are: a `FromEnv` impl with typed defaults.

use core_config::{env_or_default, ConfigError, FromEnv};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: i64,
    pub max_retries: i32,
    pub cleanup_timeout_hours: u32,
    pub enabled: bool,
    pub max_attempts: u32,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 3,
            cleanup_timeout_hours: 1,
            enabled: true,
            max_attempts: 3,
            min_wait_ms: 1_000,
            max_wait_ms: 10_000,
        }
    }
}

impl FromEnv for WorkerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let parse = |key: &str, default: &str| -> Result<String, ConfigError> {
            Ok(env_or_default(key, default))
        };

        let batch_size = parse("QUEUE_BATCH_SIZE", &defaults.batch_size.to_string())?
            .parse()
            .map_err(|e| ConfigError::ParseError { key: "QUEUE_BATCH_SIZE".into(), details: format!("{e}") })?;

        let max_retries = parse("QUEUE_MAX_RETRIES", &defaults.max_retries.to_string())?
            .parse()
            .map_err(|e| ConfigError::ParseError { key: "QUEUE_MAX_RETRIES".into(), details: format!("{e}") })?;

        let cleanup_timeout_hours = parse(
            "QUEUE_CLEANUP_TIMEOUT_HOURS",
            &defaults.cleanup_timeout_hours.to_string(),
        )?
        .parse()
        .map_err(|e| ConfigError::ParseError { key: "QUEUE_CLEANUP_TIMEOUT_HOURS".into(), details: format!("{e}") })?;

        let enabled = parse("QUEUE_ENABLED", &defaults.enabled.to_string())?
            .parse()
            .map_err(|e| ConfigError::ParseError { key: "QUEUE_ENABLED".into(), details: format!("{e}") })?;

        let max_attempts = parse("QUEUE_RETRY_MAX_ATTEMPTS", &defaults.max_attempts.to_string())?
            .parse()
            .map_err(|e| ConfigError::ParseError { key: "QUEUE_RETRY_MAX_ATTEMPTS".into(), details: format!("{e}") })?;

        let min_wait_ms = parse("QUEUE_RETRY_MIN_WAIT_MS", &defaults.min_wait_ms.to_string())?
            .parse()
            .map_err(|e| ConfigError::ParseError { key: "QUEUE_RETRY_MIN_WAIT_MS".into(), details: format!("{e}") })?;

        let max_wait_ms = parse("QUEUE_RETRY_MAX_WAIT_MS", &defaults.max_wait_ms.to_string())?
            .parse()
            .map_err(|e| ConfigError::ParseError { key: "QUEUE_RETRY_MAX_WAIT_MS".into(), details: format!("{e}") })?;

        Ok(Self {
            batch_size,
            max_retries,
            cleanup_timeout_hours,
            enabled,
            max_attempts,
            min_wait_ms,
            max_wait_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let settings = WorkerSettings::default();
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.cleanup_timeout_hours, 1);
        assert!(settings.enabled);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.min_wait_ms, 1_000);
        assert_eq!(settings.max_wait_ms, 10_000);
    }

    #[test]
    fn from_env_honors_overrides() {
        temp_env::with_vars(
            [("QUEUE_BATCH_SIZE", Some("25")), ("QUEUE_ENABLED", Some("false"))],
            || {
                let settings = WorkerSettings::from_env().unwrap();
                assert_eq!(settings.batch_size, 25);
                assert!(!settings.enabled);
                assert_eq!(settings.max_retries, 3);
            },
        );
    }
}
