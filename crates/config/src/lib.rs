//! Configuration module for greenfix
//!
//! Handles the user-facing option enums and loading configuration from TOML
//! files with environment variable overrides.

pub mod config;
pub mod options;

pub use config::*;
pub use options::*;
