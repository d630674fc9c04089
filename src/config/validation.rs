//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds >= 1, backoff factor >= 1.0)
//! - Check timeout ordering (per-attempt shorter than overall)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ResilienceConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("breaker.max_failures must be at least 1")]
    ZeroMaxFailures,

    #[error("breaker.half_open_success_threshold must be at least 1")]
    ZeroSuccessThreshold,

    #[error("retry.backoff_factor must be a finite number >= 1.0, got {0}")]
    InvalidBackoffFactor(f64),

    #[error("retry.max_delay_ms ({max_delay_ms}) is below retry.initial_delay_ms ({initial_delay_ms})")]
    MaxDelayBelowInitial {
        initial_delay_ms: u64,
        max_delay_ms: u64,
    },

    #[error("retry.jitter must be within 0.0..=1.0, got {0}")]
    InvalidJitter(f64),

    #[error("timeouts.per_attempt_ms ({per_attempt_ms}) must be shorter than timeouts.overall_ms ({overall_ms})")]
    AttemptTimeoutNotShorter { per_attempt_ms: u64, overall_ms: u64 },

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    if config.breaker.max_failures == 0 {
        errors.push(ValidationError::ZeroMaxFailures);
    }
    if config.breaker.half_open_success_threshold == 0 {
        errors.push(ValidationError::ZeroSuccessThreshold);
    }

    let retry = &config.retry;
    if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
        errors.push(ValidationError::InvalidBackoffFactor(retry.backoff_factor));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        errors.push(ValidationError::MaxDelayBelowInitial {
            initial_delay_ms: retry.initial_delay_ms,
            max_delay_ms: retry.max_delay_ms,
        });
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        errors.push(ValidationError::InvalidJitter(retry.jitter));
    }

    let timeouts = &config.timeouts;
    if timeouts.per_attempt_ms > 0
        && timeouts.overall_ms > 0
        && timeouts.per_attempt_ms >= timeouts.overall_ms
    {
        errors.push(ValidationError::AttemptTimeoutNotShorter {
            per_attempt_ms: timeouts.per_attempt_ms,
            overall_ms: timeouts.overall_ms,
        });
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ResilienceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ResilienceConfig::default();
        config.name = "  ".to_string();
        config.breaker.max_failures = 0;
        config.retry.backoff_factor = 0.5;
        config.retry.max_delay_ms = 10;
        config.retry.initial_delay_ms = 100;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::EmptyName));
        assert!(errors.contains(&ValidationError::ZeroMaxFailures));
        assert!(errors.contains(&ValidationError::InvalidBackoffFactor(0.5)));
    }

    #[test]
    fn test_nan_backoff_rejected() {
        let mut config = ResilienceConfig::default();
        config.retry.backoff_factor = f64::NAN;
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidBackoffFactor(_)));
    }

    #[test]
    fn test_attempt_timeout_must_be_shorter() {
        let mut config = ResilienceConfig::default();
        config.timeouts.per_attempt_ms = 500;
        config.timeouts.overall_ms = 500;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::AttemptTimeoutNotShorter {
                per_attempt_ms: 500,
                overall_ms: 500
            }]
        );

        config.timeouts.overall_ms = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut config = ResilienceConfig::default();
        config.observability.log_level = "DEBUG".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }
}
