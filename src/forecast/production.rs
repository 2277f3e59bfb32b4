//! Prediction providers
//!
//! Two strategies share the 48 hour contract but not their inputs, so each
//! gets its own trait: the weather-driven model scores NWP and PV history
//! datasets, the geometry-driven model only needs the site and a date.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Timelike, Utc};
use std::f64::consts::PI;

use super::timestamp::{step, HORIZON_STEPS};
use crate::config::GeometryConfig;
use crate::domain::{NwpDataset, NwpPoint, NwpSource, PowerPoint, PvHistory};

const DEG: f64 = PI / 180.0;

#[async_trait]
pub trait WeatherDrivenModel: Send + Sync {
    /// Raw 15 minute series starting at `ts`
    async fn predict(
        &self,
        nwp_source: NwpSource,
        nwp: &NwpDataset,
        pv_history: &PvHistory,
        ts: DateTime<Utc>,
    ) -> Result<Vec<PowerPoint>>;
}

#[async_trait]
pub trait GeometryModel: Send + Sync {
    /// Raw series at the model's native step. `None` when the model cannot
    /// produce a forecast.
    async fn predict_power_output(
        &self,
        latitude: f64,
        longitude: f64,
        start_date: NaiveDate,
        kwp: f64,
        orientation: f64,
        tilt: f64,
    ) -> Result<Option<Vec<PowerPoint>>>;
}

// ============================================================================
// Weather-driven: irradiance model
// ============================================================================

/// Converts NWP shortwave radiation into PV output, nudged by the latest
/// measured output when PV history has one
#[derive(Debug, Clone)]
pub struct IrradianceModel {
    /// Power temperature coefficient per °C
    pub temp_coefficient: f64,
    /// Nominal operating cell temperature (°C)
    pub noct_c: f64,
    pub system_efficiency: f64,
    /// e-folding time of the history bias correction
    pub bias_decay_hours: f64,
    /// Observations older than this are ignored
    pub max_observation_age: TimeDelta,
}

impl Default for IrradianceModel {
    fn default() -> Self {
        Self {
            temp_coefficient: -0.004,
            noct_c: 45.0,
            system_efficiency: 0.86,
            bias_decay_hours: 4.0,
            max_observation_age: TimeDelta::hours(1),
        }
    }
}

impl IrradianceModel {
    /// DC output in kW for plane irradiance `g` (W/m²) and ambient `t_amb` (°C)
    pub fn power_kw(&self, capacity_kwp: f64, g_w_m2: f64, t_amb_c: f64) -> f64 {
        // T_cell = T_amb + (NOCT - 20) * G / 800
        let t_cell = t_amb_c + (self.noct_c - 20.0) * (g_w_m2 / 800.0);
        let temp_factor = 1.0 + self.temp_coefficient * (t_cell - 25.0);
        (capacity_kwp * (g_w_m2 / 1000.0) * temp_factor * self.system_efficiency).max(0.0)
    }

    /// Ratio of measured to modelled output at the latest recent observation
    fn bias_ratio(&self, nwp: &NwpDataset, history: &PvHistory, ts: DateTime<Utc>) -> Option<f64> {
        let obs = history.latest_before(ts)?;
        if ts - obs.time > self.max_observation_age {
            return None;
        }
        let (g, t) = interpolate(&nwp.points, obs.time)?;
        let modelled_kw = self.power_kw(history.capacity_kwp, g, t);
        // Too dark for a meaningful ratio
        if modelled_kw < 0.05 * history.capacity_kwp {
            return None;
        }
        Some((obs.power_w / 1000.0 / modelled_kw).clamp(0.5, 1.5))
    }
}

#[async_trait]
impl WeatherDrivenModel for IrradianceModel {
    async fn predict(
        &self,
        nwp_source: NwpSource,
        nwp: &NwpDataset,
        pv_history: &PvHistory,
        ts: DateTime<Utc>,
    ) -> Result<Vec<PowerPoint>> {
        if nwp.source != nwp_source {
            anyhow::bail!("NWP dataset is {} but {} was requested", nwp.source, nwp_source);
        }

        let ratio = self.bias_ratio(nwp, pv_history, ts);
        if let Some(ratio) = ratio {
            tracing::debug!(ratio, "applying PV history bias correction");
        }

        let mut out = Vec::with_capacity(HORIZON_STEPS);
        for i in 0..HORIZON_STEPS as i32 {
            let time = ts + step() * i;
            // Steps outside the NWP coverage are left out
            let Some((g, t)) = interpolate(&nwp.points, time) else {
                continue;
            };

            let mut kw = self.power_kw(pv_history.capacity_kwp, g, t);
            if let Some(ratio) = ratio {
                let lead_h = (time - ts).num_minutes() as f64 / 60.0;
                kw *= 1.0 + (ratio - 1.0) * (-lead_h / self.bias_decay_hours).exp();
            }

            out.push(PowerPoint {
                time,
                power_wh: (kw * 1000.0).max(0.0),
            });
        }
        Ok(out)
    }
}

/// Linear interpolation of irradiance and temperature at `time`.
/// `points` must be sorted by time.
fn interpolate(points: &[NwpPoint], time: DateTime<Utc>) -> Option<(f64, f64)> {
    let idx = points.partition_point(|p| p.time <= time);
    if idx == 0 {
        return None;
    }
    let a = &points[idx - 1];
    if a.time == time {
        return Some((a.shortwave_radiation_w_m2, a.temperature_c));
    }
    let b = points.get(idx)?;

    let span = (b.time - a.time).num_seconds() as f64;
    let w = (time - a.time).num_seconds() as f64 / span;
    Some((
        a.shortwave_radiation_w_m2 + w * (b.shortwave_radiation_w_m2 - a.shortwave_radiation_w_m2),
        a.temperature_c + w * (b.temperature_c - a.temperature_c),
    ))
}

// ============================================================================
// Geometry-driven: clear-sky model
// ============================================================================

/// Clear-sky output projected onto the panel plane
///
/// Sun position and atmospheric attenuation follow a simplified clear-sky
/// model; no weather input is used, so the result is an upper envelope.
#[derive(Debug, Clone)]
pub struct ClearSkyModel {
    step_minutes: u32,
    system_efficiency: f64,
    /// Days emitted from `start_date` 00:00 UTC
    days: i64,
}

impl ClearSkyModel {
    pub fn new(config: &GeometryConfig) -> Self {
        Self {
            step_minutes: config.step_minutes.max(1),
            system_efficiency: config.system_efficiency,
            days: 3,
        }
    }

    /// Solar (elevation, azimuth) in degrees; azimuth clockwise from north
    pub fn solar_position(latitude: f64, longitude: f64, time: DateTime<Utc>) -> (f64, f64) {
        let day_of_year = time.ordinal() as f64;
        let hour = time.hour() as f64 + time.minute() as f64 / 60.0;

        let declination = 23.45 * (360.0 / 365.0 * (day_of_year + 284.0) * DEG).sin() * DEG;
        let lat = latitude * DEG;

        let solar_time = hour + longitude / 15.0;
        let hour_angle_deg = 15.0 * (solar_time - 12.0);
        let hour_angle = hour_angle_deg * DEG;

        let elevation =
            (lat.sin() * declination.sin() + lat.cos() * declination.cos() * hour_angle.cos())
                .asin();

        let cos_az = (declination.sin() - lat.sin() * elevation.sin())
            / (lat.cos() * elevation.cos()).max(1e-9);
        let mut azimuth = cos_az.clamp(-1.0, 1.0).acos() / DEG;
        if hour_angle_deg.rem_euclid(360.0) < 180.0 && hour_angle_deg.rem_euclid(360.0) > 0.0 {
            azimuth = 360.0 - azimuth;
        }

        (elevation / DEG, azimuth)
    }

    /// Plane-of-array irradiance in W/m²
    pub fn poa_irradiance(
        latitude: f64,
        longitude: f64,
        time: DateTime<Utc>,
        orientation: f64,
        tilt: f64,
    ) -> f64 {
        let (elevation_deg, azimuth_deg) = Self::solar_position(latitude, longitude, time);
        if elevation_deg <= 0.0 {
            return 0.0;
        }
        let elevation = elevation_deg * DEG;

        let air_mass = if elevation_deg > 5.0 {
            1.0 / elevation.sin()
        } else {
            12.0 - elevation_deg / 5.0
        };
        let dni = 1367.0 * 0.7_f64.powf(air_mass.powf(0.678));
        let ghi = dni * elevation.sin();

        let tilt_rad = tilt * DEG;
        let cos_incidence = elevation.sin() * tilt_rad.cos()
            + elevation.cos() * tilt_rad.sin() * ((azimuth_deg - orientation) * DEG).cos();

        let beam = dni * cos_incidence.max(0.0);
        let diffuse = 0.1 * ghi * (1.0 + tilt_rad.cos()) / 2.0;
        beam + diffuse
    }
}

#[async_trait]
impl GeometryModel for ClearSkyModel {
    async fn predict_power_output(
        &self,
        latitude: f64,
        longitude: f64,
        start_date: NaiveDate,
        kwp: f64,
        orientation: f64,
        tilt: f64,
    ) -> Result<Option<Vec<PowerPoint>>> {
        let start = start_date.and_time(chrono::NaiveTime::MIN).and_utc();
        let step = TimeDelta::minutes(self.step_minutes as i64);
        let count = (self.days * 24 * 60 / self.step_minutes as i64) as i32;

        let points = (0..count)
            .map(|i| {
                let time = start + step * i;
                let poa = Self::poa_irradiance(latitude, longitude, time, orientation, tilt);
                PowerPoint {
                    time,
                    power_wh: kwp * poa * self.system_efficiency,
                }
            })
            .collect();
        Ok(Some(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    /// Hourly dataset with a daytime irradiance bump
    fn nwp(source: NwpSource, hours: i64) -> NwpDataset {
        let points = (0..hours)
            .map(|h| {
                let time = start() + TimeDelta::hours(h);
                let hod = (h % 24) as f64;
                let g = if (6.0..=20.0).contains(&hod) {
                    800.0 * (PI * (hod - 6.0) / 14.0).sin()
                } else {
                    0.0
                };
                NwpPoint {
                    time,
                    shortwave_radiation_w_m2: g,
                    temperature_c: 18.0,
                    cloud_cover_percent: 20.0,
                }
            })
            .collect();
        NwpDataset { source, points }
    }

    fn history(observations: Vec<crate::domain::PvObservation>) -> PvHistory {
        PvHistory {
            capacity_kwp: 1.25,
            observations,
        }
    }

    #[test]
    fn test_power_kw_reference_conditions() {
        let model = IrradianceModel {
            system_efficiency: 1.0,
            ..Default::default()
        };
        // At 1000 W/m² the cell runs 31.25 °C above ambient
        let kw = model.power_kw(1.0, 1000.0, 25.0 - 31.25);
        assert!((kw - 1.0).abs() < 1e-9);
        assert_eq!(model.power_kw(1.0, 0.0, 10.0), 0.0);
    }

    #[test]
    fn test_interpolate() {
        let data = nwp(NwpSource::Icon, 24).points;
        let noon = start() + TimeDelta::hours(12);
        let (g12, _) = interpolate(&data, noon).unwrap();
        let (g13, _) = interpolate(&data, noon + TimeDelta::hours(1)).unwrap();
        let (mid, t) = interpolate(&data, noon + TimeDelta::minutes(30)).unwrap();
        assert!((mid - (g12 + g13) / 2.0).abs() < 1e-9);
        assert_eq!(t, 18.0);
        assert!(interpolate(&data, start() - TimeDelta::minutes(15)).is_none());
        assert!(interpolate(&data, start() + TimeDelta::hours(23) + TimeDelta::minutes(15)).is_none());
    }

    #[tokio::test]
    async fn test_irradiance_model_full_horizon() {
        let model = IrradianceModel::default();
        let ts = start() + TimeDelta::hours(6);
        let out = model
            .predict(NwpSource::Gfs, &nwp(NwpSource::Gfs, 72), &history(vec![]), ts)
            .await
            .unwrap();

        assert_eq!(out.len(), HORIZON_STEPS);
        assert_eq!(out[0].time, ts);
        assert!(out.iter().all(|p| p.power_wh >= 0.0));
        assert!(out.iter().any(|p| p.power_wh > 0.0));
    }

    #[tokio::test]
    async fn test_irradiance_model_stops_at_nwp_coverage() {
        let model = IrradianceModel::default();
        let out = model
            .predict(NwpSource::Icon, &nwp(NwpSource::Icon, 24), &history(vec![]), start())
            .await
            .unwrap();
        // 00:00 through 23:00 inclusive
        assert_eq!(out.len(), 23 * 4 + 1);
    }

    #[tokio::test]
    async fn test_irradiance_model_rejects_source_mismatch() {
        let model = IrradianceModel::default();
        let result = model
            .predict(NwpSource::Icon, &nwp(NwpSource::Gfs, 72), &history(vec![]), start())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_history_bias_scales_near_term_only() {
        let model = IrradianceModel::default();
        let data = nwp(NwpSource::Icon, 72);
        let ts = start() + TimeDelta::hours(12);

        let baseline = model
            .predict(NwpSource::Icon, &data, &history(vec![]), ts)
            .await
            .unwrap();
        let expected_kw = model.power_kw(1.25, 800.0 * (PI * 6.0 / 14.0).sin(), 18.0);
        let observed = crate::domain::PvObservation {
            time: ts,
            power_w: expected_kw * 1000.0 * 0.6,
        };
        let corrected = model
            .predict(NwpSource::Icon, &data, &history(vec![observed]), ts)
            .await
            .unwrap();

        assert!((corrected[0].power_wh / baseline[0].power_wh - 0.6).abs() < 1e-6);
        // A day later the correction has decayed away
        let later = 24 * 4;
        assert!((corrected[later].power_wh / baseline[later].power_wh - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_solar_noon_faces_south() {
        // Greenwich, summer solstice: sun due south near 62° elevation
        let noon = Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap();
        let (elevation, azimuth) = ClearSkyModel::solar_position(51.48, 0.0, noon);
        assert!((elevation - 62.0).abs() < 1.5, "elevation {}", elevation);
        assert!((azimuth - 180.0).abs() < 1.0, "azimuth {}", azimuth);
    }

    #[test]
    fn test_poa_zero_at_night() {
        let midnight = Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap();
        assert_eq!(
            ClearSkyModel::poa_irradiance(51.48, 0.0, midnight, 180.0, 35.0),
            0.0
        );
    }

    #[test]
    fn test_south_facing_beats_north_facing_at_noon() {
        let noon = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let south = ClearSkyModel::poa_irradiance(51.75, -1.25, noon, 180.0, 35.0);
        let north = ClearSkyModel::poa_irradiance(51.75, -1.25, noon, 0.0, 35.0);
        assert!(south > north);
    }

    #[tokio::test]
    async fn test_clear_sky_native_step() {
        let model = ClearSkyModel::new(&GeometryConfig {
            step_minutes: 60,
            system_efficiency: 0.86,
        });
        let out = model
            .predict_power_output(51.75, -1.25, start().date_naive(), 1.25, 180.0, 35.0)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out.len(), 72);
        assert_eq!(out[0].time, start());
        assert_eq!(out[1].time - out[0].time, TimeDelta::hours(1));
        assert!(out.iter().all(|p| p.power_wh >= 0.0));
    }
}
