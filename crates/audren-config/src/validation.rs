//! Range checks for engine configuration.
//!
//! Every check runs; the caller gets all violations at once, wrapped in
//! [`ValidationError::Multiple`] when there is more than one.
//!
//! ```rust
//! use audren_config::{EngineConfig, ValidationError};
//!
//! let mut config = EngineConfig::default();
//! config.renderer.sample_rate = 44_100;
//! config.driver.channel_count = 3;
//!
//! match config.validate() {
//!     Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use audren_core::constants::is_channel_count_valid;
use audren_core::renderer::SUPPORTED_SAMPLE_RATES;
use audren_core::{LAST_REVISION, MIX_BUFFER_COUNT_MAX};
use thiserror::Error;

use crate::engine::{DriverConfig, EngineConfig, RendererConfig};

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A numeric field is outside its accepted range.
    #[error("{field} = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Dotted field path.
        field: &'static str,
        /// Offending value.
        value: u64,
        /// Smallest accepted value.
        min: u64,
        /// Largest accepted value.
        max: u64,
    },

    /// A field holds a value outside a fixed set.
    #[error("{field} = {value} is not supported (expected one of {expected})")]
    Unsupported {
        /// Dotted field path.
        field: &'static str,
        /// Offending value.
        value: u64,
        /// Accepted values, for display.
        expected: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn check_range(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) {
    if value < min || value > max {
        errors.push(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
}

fn renderer_errors(config: &RendererConfig, errors: &mut Vec<ValidationError>) {
    if !SUPPORTED_SAMPLE_RATES.contains(&config.sample_rate) {
        errors.push(ValidationError::Unsupported {
            field: "renderer.sample_rate",
            value: u64::from(config.sample_rate),
            expected: format!("{SUPPORTED_SAMPLE_RATES:?}"),
        });
    }
    check_range(
        errors,
        "renderer.sample_count",
        u64::from(config.sample_count),
        1,
        u64::from(config.sample_rate),
    );
    check_range(
        errors,
        "renderer.mix_buffer_count",
        u64::from(config.mix_buffer_count),
        1,
        (MIX_BUFFER_COUNT_MAX * 32) as u64,
    );
    check_range(
        errors,
        "renderer.revision",
        u64::from(config.revision),
        1,
        u64::from(LAST_REVISION),
    );
    if config.splitter_count > 0 && config.splitter_destination_count == 0 {
        errors.push(ValidationError::OutOfRange {
            field: "renderer.splitter_destination_count",
            value: 0,
            min: 1,
            max: u64::from(u32::MAX),
        });
    }
}

fn driver_errors(config: &DriverConfig, errors: &mut Vec<ValidationError>) {
    check_range(errors, "driver.poll_interval_ms", config.poll_interval_ms, 1, 1000);
    check_range(
        errors,
        "driver.queue_capacity",
        config.queue_capacity as u64,
        1,
        1024,
    );
    check_range(errors, "driver.max_sessions", config.max_sessions as u64, 1, 256);
    if !is_channel_count_valid(u32::from(config.channel_count)) {
        errors.push(ValidationError::Unsupported {
            field: "driver.channel_count",
            value: u64::from(config.channel_count),
            expected: "[1, 2, 4, 6]".to_string(),
        });
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

/// Validates renderer limits.
pub fn validate_renderer(config: &RendererConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    renderer_errors(config, &mut errors);
    collect(errors)
}

/// Validates driver settings.
pub fn validate_driver(config: &DriverConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    driver_errors(config, &mut errors);
    collect(errors)
}

/// Validates a whole engine configuration, reporting every violation.
pub fn validate_engine(config: &EngineConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    renderer_errors(&config.renderer, &mut errors);
    driver_errors(&config.driver, &mut errors);
    collect(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_engine(&EngineConfig::default()), Ok(()));
    }

    #[test]
    fn single_violation_is_not_wrapped() {
        let config = RendererConfig {
            revision: 0,
            ..RendererConfig::default()
        };
        let err = validate_renderer(&config).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OutOfRange {
                field: "renderer.revision",
                value: 0,
                ..
            }
        ));
    }

    #[test]
    fn every_violation_is_reported() {
        let config = DriverConfig {
            poll_interval_ms: 0,
            queue_capacity: 0,
            channel_count: 5,
            ..DriverConfig::default()
        };
        let Err(ValidationError::Multiple(errors)) = validate_driver(&config) else {
            panic!("expected multiple errors");
        };
        assert_eq!(errors.len(), 3);
        let msg = ValidationError::Multiple(errors).to_string();
        assert!(msg.contains("driver.poll_interval_ms"), "got: {msg}");
        assert!(msg.contains("driver.channel_count"), "got: {msg}");
    }

    #[test]
    fn splitters_need_destinations() {
        let config = RendererConfig {
            splitter_count: 2,
            splitter_destination_count: 0,
            ..RendererConfig::default()
        };
        assert!(validate_renderer(&config).is_err());
    }
}
