//! Series repository for forecast-rs
//!
//! Fetches historical time series from a data store and hands them out in the
//! normalized [`TimeSeries`](forecast_core::TimeSeries) shape. It includes:
//!
//! - The [`SeriesRepository`] trait consumed by the forecast orchestrator
//! - [`InMemorySeriesRepository`] for tests and embedded data
//! - [`JsonFileRepository`] reading a long-format table export
//!   (`date`, `variable`, `value` rows, one variable per series)
//! - [`CachedSeriesRepository`], a TTL cache in front of any repository
//!
//! # Example
//!
//! ```rust,ignore
//! use forecast_core::{DateRange, SeriesId};
//! use forecast_series::{JsonFileRepository, SeriesRepository};
//!
//! let repository = JsonFileRepository::open("sales_economics.json").await?;
//! let series = repository
//!     .get_series(&SeriesId::new("unemploy"), &DateRange::all())
//!     .await?;
//! println!("{} observations", series.len());
//! ```

pub mod cache;
pub mod error;
pub mod file;
pub mod repository;

pub use cache::CachedSeriesRepository;
pub use error::{Result, SeriesError};
pub use file::{JsonFileRepository, SeriesRecord};
pub use repository::{InMemorySeriesRepository, SeriesRepository};
