use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ForecastError;

pub const DEFAULT_ORIENTATION_DEG: f64 = 180.0;
pub const DEFAULT_TILT_DEG: f64 = 35.0;

fn default_orientation() -> f64 {
    DEFAULT_ORIENTATION_DEG
}

fn default_tilt() -> f64 {
    DEFAULT_TILT_DEG
}

/// Physical PV installation a forecast is produced for. Fields are read-only
/// once constructed; deserialized sites are validated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PvSite {
    /// Latitude in degrees (positive = north)
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: f64,
    /// Longitude in degrees (positive = east)
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: f64,
    /// Installed peak capacity in kWp
    #[validate(range(exclusive_min = 0.0))]
    capacity_kwp: f64,
    /// Panel azimuth, degrees clockwise from north
    #[serde(default = "default_orientation")]
    #[validate(range(min = 0.0, max = 360.0))]
    orientation: f64,
    /// Panel inclination, degrees from horizontal
    #[serde(default = "default_tilt")]
    #[validate(range(min = 0.0, max = 90.0))]
    tilt: f64,
}

impl Default for PvSite {
    fn default() -> Self {
        Self {
            latitude: 51.75,
            longitude: -1.25,
            capacity_kwp: 1.25,
            orientation: DEFAULT_ORIENTATION_DEG,
            tilt: DEFAULT_TILT_DEG,
        }
    }
}

impl PvSite {
    /// Create a validated site facing south at the default tilt
    pub fn new(latitude: f64, longitude: f64, capacity_kwp: f64) -> Result<Self, ForecastError> {
        Self::with_geometry(
            latitude,
            longitude,
            capacity_kwp,
            DEFAULT_ORIENTATION_DEG,
            DEFAULT_TILT_DEG,
        )
    }

    /// Create a validated site with explicit panel orientation and tilt
    pub fn with_geometry(
        latitude: f64,
        longitude: f64,
        capacity_kwp: f64,
        orientation: f64,
        tilt: f64,
    ) -> Result<Self, ForecastError> {
        let site = Self {
            latitude,
            longitude,
            capacity_kwp,
            orientation,
            tilt,
        };
        site.validate()?;
        Ok(site)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn capacity_kwp(&self) -> f64 {
        self.capacity_kwp
    }

    pub fn orientation(&self) -> f64 {
        self.orientation
    }

    pub fn tilt(&self) -> f64 {
        self.tilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let site = PvSite::new(51.75, -1.25, 1.25).unwrap();
        assert_eq!(site.orientation(), 180.0);
        assert_eq!(site.tilt(), 35.0);
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let site: PvSite =
            serde_json::from_str(r#"{"latitude": 51.75, "longitude": -1.25, "capacity_kwp": 1.25}"#)
                .unwrap();
        assert_eq!(site, PvSite::new(51.75, -1.25, 1.25).unwrap());
    }

    #[rstest]
    #[case(91.0, 0.0, 1.0)]
    #[case(-90.5, 0.0, 1.0)]
    #[case(0.0, 181.0, 1.0)]
    #[case(0.0, -180.1, 1.0)]
    #[case(0.0, 0.0, 0.0)]
    #[case(0.0, 0.0, -2.5)]
    fn test_rejects_out_of_range(#[case] lat: f64, #[case] lon: f64, #[case] kwp: f64) {
        let result = PvSite::new(lat, lon, kwp);
        assert!(matches!(result, Err(ForecastError::InvalidSite(_))));
    }

    #[test]
    fn test_default_site_is_valid() {
        assert!(PvSite::default().validate().is_ok());
    }

    #[test]
    fn test_deserialize_does_not_validate() {
        let site: PvSite =
            serde_json::from_str(r#"{"latitude": 123.0, "longitude": 0.0, "capacity_kwp": 1.0}"#)
                .unwrap();
        assert_eq!(site.latitude(), 123.0);
        assert!(site.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_tilt() {
        let result = PvSite::with_geometry(51.75, -1.25, 1.25, 180.0, 120.0);
        assert!(matches!(result, Err(ForecastError::InvalidSite(_))));
    }
}
