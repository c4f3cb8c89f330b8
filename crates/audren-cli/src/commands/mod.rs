//! CLI command implementations.

pub mod check_config;
pub mod play;
pub mod simulate;
