//! Configuration for the audren renderer.
//!
//! This crate loads the engine configuration file and simulation scenarios.
//!
//! # Features
//!
//! - **Engine config**: renderer limits and hardware driver settings, from TOML
//! - **Validation**: every out-of-range field reported at once
//! - **Scenarios**: frame-by-frame renderer input for dry runs
//! - **Paths**: platform-specific config locations (feature `paths`)
//!
//! # Example
//!
//! ```rust,no_run
//! use audren_config::{EngineConfig, Scenario};
//!
//! let config = EngineConfig::load_validated("engine.toml").unwrap();
//! let parameters = config.renderer.to_parameters();
//!
//! let scenario = Scenario::load("star.toml").unwrap();
//! for frame in scenario.frames().unwrap() {
//!     let _input = frame.input();
//! }
//! # let _ = parameters;
//! ```

mod engine;
mod error;
mod scenario;

/// Platform-specific configuration locations.
#[cfg(feature = "paths")]
pub mod paths;

/// Engine configuration validation.
pub mod validation;

pub use engine::{DriverConfig, EngineConfig, RendererConfig};
pub use error::{ConfigError, Result};
pub use scenario::{
    BufferSpec, DestinationSpec, EffectKind, EffectSpec, Frame, FrameSpec, MixSpec, PoolSpec,
    Scenario, SinkKind, SinkSpec, SplitterSpec,
};
pub use validation::{
    ValidationError, ValidationResult, validate_driver, validate_engine, validate_renderer,
};
