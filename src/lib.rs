//! 48-hour photovoltaic power forecasts.
//!
//! [`forecast::ForecastEngine`] resolves the forecast start, dispatches to a
//! weather-driven or geometry-driven provider and windows the result to
//! `[start, start + 48h)`. [`inverters::enphase`] reads live production
//! through the Enphase OAuth2 flow.

pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod inverters;
pub mod telemetry;

pub use domain::{ForecastTime, NwpSource, PowerSeries, ProviderKind, PvSite};
pub use error::{ForecastError, TelemetryError};
pub use forecast::ForecastEngine;
