//! Configuration validation.
//!
//! Catches values that would make a run meaningless (zero caps, a
//! non-positive threshold) before any network call is made.

use thiserror::Error;

use crate::config::{Config, GridConfig, ObservabilityConfig, RecapConfig, SourcesConfig, WatchConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
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

        let sections: [&dyn Validate; 5] = [
            &self.observability,
            &self.sources,
            &self.recap,
            &self.grid,
            &self.watch,
        ];
        for section in sections {
            if let Err(e) = section.validate() {
                errors.push(e);
            }
        }

        for (i, stock) in self.stocks.iter().enumerate() {
            if stock.code.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("stocks[{}].code", i),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load, apply environment overrides and validate.
    pub fn load_and_validate(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let config = Self::load_with_env(path)?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.log_format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(ValidationError::invalid(
                "observability.log_format",
                format!("expected json or pretty, got {}", other),
            )),
        }
    }
}

impl Validate for SourcesConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.call_timeout_secs == 0 {
            return Err(ValidationError::invalid(
                "sources.call_timeout_secs",
                "must be at least 1",
            ));
        }
        if self.user_agents.is_empty() {
            return Err(ValidationError::invalid(
                "sources.user_agents",
                "at least one User-Agent is required",
            ));
        }
        Ok(())
    }
}

impl Validate for RecapConfig {
    fn validate(&self) -> ValidationResult<()> {
        let checks = [
            ("recap.top_k", self.top_k),
            ("recap.leader_cap", self.leader_cap),
            ("recap.leader_concurrency", self.leader_concurrency),
            ("recap.ledger_limit", self.ledger_limit),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ValidationError::invalid(field, "must be greater than 0"));
            }
        }
        Ok(())
    }
}

impl Validate for GridConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(self.threshold_pct > 0.0 && self.threshold_pct < 100.0) {
            return Err(ValidationError::invalid(
                "grid.threshold_pct",
                "must be between 0 and 100 (exclusive)",
            ));
        }
        if self.unit_size <= 0.0 {
            return Err(ValidationError::invalid("grid.unit_size", "must be positive"));
        }
        if self.min_history < 2 {
            return Err(ValidationError::invalid("grid.min_history", "must be at least 2"));
        }
        if self.lookback_days == 0 {
            return Err(ValidationError::invalid("grid.lookback_days", "must be greater than 0"));
        }
        Ok(())
    }
}

impl Validate for WatchConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.interval_secs == 0 || self.write_interval_secs == 0 || self.file_interval_secs == 0 {
            return Err(ValidationError::invalid("watch", "intervals must be greater than 0"));
        }
        Ok(())
    }
}
