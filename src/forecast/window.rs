use chrono::{DateTime, Utc};

use super::timestamp::{horizon, step, HORIZON_STEPS};
use crate::domain::{PowerPoint, PowerSeries};
use crate::error::ForecastError;

/// Half-open forecast interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ForecastWindow {
    /// 48 hour window beginning at an already aligned `start`
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: start + horizon(),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Every 15 minute instant inside the window
    pub fn steps(&self) -> impl Iterator<Item = DateTime<Utc>> {
        let start = self.start;
        (0..HORIZON_STEPS as i32).map(move |i| start + step() * i)
    }

    /// Keep the samples inside the window, rebuilt in time order and keyed
    /// by instant. Samples are not checked for quarter-hour alignment.
    pub fn apply<I>(&self, raw: I) -> PowerSeries
    where
        I: IntoIterator<Item = PowerPoint>,
    {
        raw.into_iter().filter(|p| self.contains(p.time)).collect()
    }

    /// Window `raw` and require exactly one sample per 15 minute step
    pub fn apply_complete<I>(&self, raw: I) -> Result<PowerSeries, ForecastError>
    where
        I: IntoIterator<Item = PowerPoint>,
    {
        let series = self.apply(raw);
        let covered = self
            .steps()
            .filter(|ts| series.get(ts).is_some())
            .count();

        if covered != HORIZON_STEPS || series.len() != HORIZON_STEPS {
            return Err(ForecastError::IncompleteForecast {
                expected: HORIZON_STEPS,
                actual: covered,
            });
        }
        Ok(series)
    }
}
