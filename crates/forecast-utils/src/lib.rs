//! Shared utilities for forecast-rs
//!
//! This crate provides common functionality used across the forecast-rs workspace,
//! including logging setup and JSON configuration file loading.

pub mod config;
pub mod logging;

pub use config::{ConfigError, load_json};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
