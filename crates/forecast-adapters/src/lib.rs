//! Forecast model adapters for forecast-rs
//!
//! This crate puts every forecasting backend behind one interface. It includes:
//!
//! - The [`ForecastAdapter`] trait and request validation helpers
//! - Local statistical baselines (naive, drift, smoothing, ...)
//! - A client for the remote forecasting service (behind the `remote` feature)
//! - The [`AdapterRegistry`] built from a models file

pub mod adapter;
pub mod config;
pub mod error;
pub mod local;
pub mod registry;

#[cfg(feature = "remote")]
pub mod remote;

// Re-export main types
pub use adapter::{AdapterCapabilities, CONFIDENCE_INTERVAL, Failure, ForecastAdapter, validate_request};
pub use config::{BackendConfig, ModelEntry, ModelsFile};
pub use error::{AdapterError, Result};
pub use local::{LocalAdapter, LocalModel};
pub use registry::{AdapterRegistry, AdapterRegistryBuilder};

#[cfg(feature = "remote")]
pub use remote::{RemoteClient, RemoteForecastAdapter, RemoteSettings};
