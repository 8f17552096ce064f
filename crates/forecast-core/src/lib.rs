//! Core data model for forecast-rs
//!
//! This crate defines the shapes shared by every layer of the forecast
//! comparison engine: the immutable [`TimeSeries`] fetched from a data store,
//! the [`ForecastRequest`] dispatched to each model adapter, the normalized
//! [`ForecastResult`] every adapter produces, and the [`Error`] taxonomy used
//! at the public entry points.

pub mod error;
pub mod forecast;
pub mod series;

pub use error::{Error, Result};
pub use forecast::{
    FailureKind, ForecastPoint, ForecastRequest, ForecastResult, ForecastStatus, ModelId,
    ModelOptions,
};
pub use series::{
    Cadence, DateRange, Observation, SeriesId, TimeSeries, ValueScale, parse_timestamp,
};
