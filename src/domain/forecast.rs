use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use super::PvSite;

/// Prediction strategy a forecast is dispatched to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// NWP and PV history driven model
    #[strum(to_string = "weather-driven", serialize = "ocf")]
    #[serde(alias = "ocf")]
    WeatherDriven,
    /// Solar geometry model, no NWP input
    #[strum(to_string = "geometry-driven", serialize = "tryolabs")]
    #[serde(alias = "tryolabs")]
    GeometryDriven,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::WeatherDriven, ProviderKind::GeometryDriven];

    /// Canonical names of every provider, for error reporting
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| <&'static str>::from(*p)).collect()
    }
}

/// Numerical weather prediction source
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum NwpSource {
    Gfs,
    #[default]
    Icon,
}

/// Forecast start as given by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForecastTime {
    At(DateTime<Utc>),
    /// ISO-8601 text, parsed during resolution
    Iso(String),
}

impl From<DateTime<Utc>> for ForecastTime {
    fn from(ts: DateTime<Utc>) -> Self {
        ForecastTime::At(ts)
    }
}

impl From<&str> for ForecastTime {
    fn from(ts: &str) -> Self {
        ForecastTime::Iso(ts.to_string())
    }
}

impl From<String> for ForecastTime {
    fn from(ts: String) -> Self {
        ForecastTime::Iso(ts)
    }
}

#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub site: PvSite,
    pub provider: ProviderKind,
    /// `None` means now, floored to the quarter hour
    pub timestamp: Option<ForecastTime>,
    pub nwp_source: NwpSource,
}

/// One raw provider output sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerPoint {
    pub time: DateTime<Utc>,
    pub power_wh: f64,
}

/// Windowed forecast keyed by instant, ascending and free of duplicates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerSeries(BTreeMap<DateTime<Utc>, f64>);

impl PowerSeries {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, time: &DateTime<Utc>) -> Option<f64> {
        self.0.get(time).copied()
    }

    pub fn first(&self) -> Option<(DateTime<Utc>, f64)> {
        self.0.first_key_value().map(|(t, v)| (*t, *v))
    }

    pub fn last(&self) -> Option<(DateTime<Utc>, f64)> {
        self.0.last_key_value().map(|(t, v)| (*t, *v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.0.iter().map(|(t, v)| (*t, *v))
    }

    pub fn max_power_wh(&self) -> Option<f64> {
        self.0.values().copied().reduce(f64::max)
    }

    /// The series as raw points, in ascending time order
    pub fn to_points(&self) -> Vec<PowerPoint> {
        self.iter()
            .map(|(time, power_wh)| PowerPoint { time, power_wh })
            .collect()
    }
}

impl FromIterator<PowerPoint> for PowerSeries {
    /// The first sample seen for an instant wins
    fn from_iter<I: IntoIterator<Item = PowerPoint>>(iter: I) -> Self {
        let mut map = BTreeMap::new();
        for p in iter {
            map.entry(p.time).or_insert(p.power_wh);
        }
        Self(map)
    }
}

/// Hourly NWP sample at the site location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NwpPoint {
    pub time: DateTime<Utc>,
    pub shortwave_radiation_w_m2: f64,
    pub temperature_c: f64,
    pub cloud_cover_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NwpDataset {
    pub source: NwpSource,
    pub points: Vec<NwpPoint>,
}

/// Measured PV output at an instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PvObservation {
    pub time: DateTime<Utc>,
    pub power_w: f64,
}

/// Recent generation of a site, as handed to the weather-driven model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvHistory {
    pub capacity_kwp: f64,
    pub observations: Vec<PvObservation>,
}

impl PvHistory {
    /// History with no observations
    pub fn empty(site: &PvSite) -> Self {
        Self {
            capacity_kwp: site.capacity_kwp(),
            observations: Vec::new(),
        }
    }

    /// Most recent observation at or before `ts`
    pub fn latest_before(&self, ts: DateTime<Utc>) -> Option<PvObservation> {
        self.observations
            .iter()
            .filter(|o| o.time <= ts)
            .max_by_key(|o| o.time)
            .copied()
    }
}
