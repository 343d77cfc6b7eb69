//! Configuration validation.
//!
//! Checks that all values are present and within valid ranges before the
//! service starts.

use thiserror::Error;

use crate::config::{Config, ObservabilityConfig, PicksConfig, ServerConfig, StoreBackend};

/// Markets the screener knows how to query.
pub const KNOWN_MARKETS: &[&str] = &[
    "NSE", "BSE", "NASDAQ", "NYSE", "LSE", "TSX", "ASX", "HKEX", "XETRA", "TSE",
];

/// Longest accepted report refresh interval (one year).
pub const MAX_REFRESH_INTERVAL_HOURS: u64 = 24 * 366;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.server.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.picks.validate() {
            errors.push(e);
        }

        // A cold request waits for a whole generation.
        if self.server.request_timeout_secs <= self.picks.generation_deadline_secs {
            errors.push(ValidationError::InvalidValue {
                field: "server.request_timeout_secs".into(),
                reason: format!(
                    "must exceed picks.generation_deadline_secs ({})",
                    self.picks.generation_deadline_secs
                ),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for PicksConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.markets.is_empty() {
            return Err(ValidationError::MissingField {
                field: "picks.markets".into(),
            });
        }
        if let Some(unknown) = self
            .markets
            .iter()
            .find(|m| !KNOWN_MARKETS.contains(&m.to_uppercase().as_str()))
        {
            return Err(ValidationError::InvalidValue {
                field: "picks.markets".into(),
                reason: format!(
                    "unknown market '{}', expected one of: {}",
                    unknown,
                    KNOWN_MARKETS.join(", ")
                ),
            });
        }

        let positive: [(&str, u64); 7] = [
            ("picks.scan_limit", self.scan_limit as u64),
            ("picks.export_cap", self.export_cap as u64),
            ("picks.refresh_interval_hours", self.refresh_interval_hours),
            ("picks.generation_deadline_secs", self.generation_deadline_secs),
            ("picks.upstream.quote_chunk_size", self.upstream.quote_chunk_size as u64),
            ("picks.upstream.history_chunk_size", self.upstream.history_chunk_size as u64),
            ("picks.upstream.fetch_concurrency", self.upstream.fetch_concurrency as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }

        if self.refresh_interval_hours > MAX_REFRESH_INTERVAL_HOURS {
            return Err(ValidationError::InvalidValue {
                field: "picks.refresh_interval_hours".into(),
                reason: format!("must be at most {MAX_REFRESH_INTERVAL_HOURS}"),
            });
        }

        let scoring = &self.scoring;
        if scoring.rsi_period == 0 || scoring.sma_fast == 0 || scoring.sma_slow == 0 {
            return Err(ValidationError::InvalidValue {
                field: "picks.scoring".into(),
                reason: "indicator periods must be greater than zero".into(),
            });
        }
        if scoring.rsi_band.0 > scoring.rsi_band.1 || scoring.pe_band.0 > scoring.pe_band.1 {
            return Err(ValidationError::InvalidValue {
                field: "picks.scoring".into(),
                reason: "band lower bound exceeds upper bound".into(),
            });
        }

        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_none() {
            return Err(ValidationError::MissingField {
                field: "picks.store.redis_url".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "invalid".into();
        let result = config.validate();
        assert!(result.is_err());
        if let Err(ValidationError::InvalidValue { field, .. }) = result {
            assert_eq!(field, "observability.log_level");
        }
    }

    #[test]
    fn test_unknown_market() {
        let mut config = Config::default();
        config.picks.markets = vec!["NSE".into(), "MOON".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("MOON"));
    }

    #[test]
    fn test_zero_chunk_size() {
        let mut config = Config::default();
        config.picks.upstream.quote_chunk_size = 0;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "picks.upstream.quote_chunk_size"
        ));
    }

    #[test]
    fn test_redis_requires_url() {
        let mut config = Config::default();
        config.picks.store.backend = StoreBackend::Redis;
        assert!(config.validate().is_err());

        config.picks.store.redis_url = Some("redis://127.0.0.1:6379".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_request_timeout_must_exceed_generation_deadline() {
        let mut config = Config::default();
        config.server.request_timeout_secs = config.picks.generation_deadline_secs;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "server.request_timeout_secs"
        ));

        config.server.request_timeout_secs = config.picks.generation_deadline_secs + 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_refresh_interval_upper_bound() {
        let mut config = Config::default();
        config.picks.refresh_interval_hours = u64::MAX / 60;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "picks.refresh_interval_hours"
        ));

        config.picks.refresh_interval_hours = MAX_REFRESH_INTERVAL_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.server.port = 0;
        config.observability.log_format = "xml".into();
        assert!(matches!(config.validate(), Err(ValidationError::Multiple(errs)) if errs.len() == 2));
    }
}
