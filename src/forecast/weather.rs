//! NWP data for the weather-driven provider (Open-Meteo)
//!
//! Open-Meteo serves both GFS and ICON runs interpolated to a point. Recent
//! runs come from the forecast API; runs older than the forecast archive
//! window come from the historical-forecast API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::timestamp::horizon;
use crate::config::NwpConfig;
use crate::domain::{NwpDataset, NwpPoint, NwpSource, PvSite};

/// Requests older than this are served from the historical-forecast API
const ARCHIVE_AFTER_DAYS: i64 = 90;

const HOURLY_VARIABLES: &str = "temperature_2m,shortwave_radiation,cloud_cover";

#[async_trait]
pub trait NwpProvider: Send + Sync {
    async fn get_nwp(&self, site: &PvSite, ts: DateTime<Utc>, source: NwpSource)
        -> Result<NwpDataset>;
}

pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    archive_base_url: String,
}

impl OpenMeteoClient {
    pub fn new(config: &NwpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            archive_base_url: config.archive_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn model_name(source: NwpSource) -> &'static str {
        match source {
            NwpSource::Gfs => "gfs_seamless",
            NwpSource::Icon => "icon_seamless",
        }
    }

    /// Calendar days (inclusive) of hourly data needed to interpolate every
    /// step of the window starting at `ts`. The hourly sample after the last
    /// step can fall on the following day.
    fn requested_dates(ts: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        let last_needed = ts + horizon() + TimeDelta::hours(1);
        (ts.date_naive(), last_needed.date_naive())
    }

    fn base_url_for(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> &str {
        if now - ts > TimeDelta::days(ARCHIVE_AFTER_DAYS) {
            &self.archive_base_url
        } else {
            &self.base_url
        }
    }

    fn parse_response(source: NwpSource, response: OpenMeteoResponse) -> Result<NwpDataset> {
        let hourly = response.hourly;
        let n = hourly.time.len();
        if hourly.temperature_2m.len() != n
            || hourly.shortwave_radiation.len() != n
            || hourly.cloud_cover.len() != n
        {
            anyhow::bail!("Open-Meteo hourly arrays differ in length");
        }

        let mut points = Vec::with_capacity(n);
        for i in 0..n {
            let time = NaiveDateTime::parse_from_str(&hourly.time[i], "%Y-%m-%dT%H:%M")
                .with_context(|| format!("bad Open-Meteo time '{}'", hourly.time[i]))?
                .and_utc();

            // Missing model values are reported as null
            points.push(NwpPoint {
                time,
                shortwave_radiation_w_m2: hourly.shortwave_radiation[i].unwrap_or(0.0),
                temperature_c: hourly.temperature_2m[i].unwrap_or(15.0),
                cloud_cover_percent: hourly.cloud_cover[i].unwrap_or(0.0),
            });
        }

        Ok(NwpDataset { source, points })
    }
}

#[async_trait]
impl NwpProvider for OpenMeteoClient {
    async fn get_nwp(
        &self,
        site: &PvSite,
        ts: DateTime<Utc>,
        source: NwpSource,
    ) -> Result<NwpDataset> {
        let base_url = self.base_url_for(ts, Utc::now());
        let url = format!("{}/v1/forecast", base_url);
        let (start_date, end_date) = Self::requested_dates(ts);
        let start_date = start_date.format("%Y-%m-%d").to_string();
        let end_date = end_date.format("%Y-%m-%d").to_string();

        debug!(%url, %source, %start_date, %end_date, "fetching NWP data");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", format!("{:.4}", site.latitude())),
                ("longitude", format!("{:.4}", site.longitude())),
                ("hourly", HOURLY_VARIABLES.to_string()),
                ("models", Self::model_name(source).to_string()),
                ("start_date", start_date),
                ("end_date", end_date),
                ("timezone", "GMT".to_string()),
            ])
            .send()
            .await
            .context("Open-Meteo GET failed")?;

        let status = response.status();
        let body = response.text().await.context("Open-Meteo read failed")?;
        if !status.is_success() {
            anyhow::bail!("Open-Meteo API error: HTTP {status}: {body}");
        }

        let raw: OpenMeteoResponse =
            serde_json::from_str(&body).context("Open-Meteo JSON parse failed")?;
        let dataset = Self::parse_response(source, raw)?;

        info!(
            %source,
            points = dataset.points.len(),
            "fetched NWP data for ({}, {})",
            site.latitude(),
            site.longitude()
        );
        Ok(dataset)
    }
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    hourly: OpenMeteoHourly,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    shortwave_radiation: Vec<Option<f64>>,
    cloud_cover: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::timestamp::{floor_to_step, step};
    use chrono::{DurationRound, TimeZone};
    use proptest::prelude::*;
    use rstest::rstest;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, archive_base_url: &str) -> NwpConfig {
        NwpConfig {
            base_url: base_url.to_string(),
            archive_base_url: archive_base_url.to_string(),
            http_timeout_seconds: 5,
        }
    }

    fn body() -> serde_json::Value {
        serde_json::json!({
            "latitude": 51.75,
            "longitude": -1.25,
            "hourly": {
                "time": ["2024-06-01T00:00", "2024-06-01T01:00", "2024-06-01T02:00"],
                "temperature_2m": [12.5, 12.1, null],
                "shortwave_radiation": [0.0, 0.0, 35.0],
                "cloud_cover": [80.0, 75.0, 60.0]
            }
        })
    }

    #[test]
    fn test_parse_response() {
        let raw: OpenMeteoResponse = serde_json::from_value(body()).unwrap();
        let dataset = OpenMeteoClient::parse_response(NwpSource::Icon, raw).unwrap();

        assert_eq!(dataset.source, NwpSource::Icon);
        assert_eq!(dataset.points.len(), 3);
        assert_eq!(
            dataset.points[2].time,
            Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap()
        );
        assert_eq!(dataset.points[2].shortwave_radiation_w_m2, 35.0);
        assert_eq!(dataset.points[2].temperature_c, 15.0);
    }

    #[test]
    fn test_parse_response_rejects_ragged_arrays() {
        let mut value = body();
        value["hourly"]["cloud_cover"] = serde_json::json!([1.0]);
        let raw: OpenMeteoResponse = serde_json::from_value(value).unwrap();
        assert!(OpenMeteoClient::parse_response(NwpSource::Gfs, raw).is_err());
    }

    #[test]
    fn test_archive_selected_for_old_timestamps() {
        let client = OpenMeteoClient::new(&config("http://live", "http://archive")).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        assert_eq!(client.base_url_for(now - TimeDelta::days(14), now), "http://live");
        assert_eq!(client.base_url_for(now - TimeDelta::days(200), now), "http://archive");
    }

    #[rstest]
    #[case(10, 0, "2024-06-03")]
    #[case(22, 45, "2024-06-03")]
    #[case(23, 0, "2024-06-03")]
    #[case(23, 30, "2024-06-04")]
    #[case(23, 45, "2024-06-04")]
    fn test_requested_dates_reach_sample_after_window(
        #[case] hour: u32,
        #[case] minute: u32,
        #[case] end: &str,
    ) {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap();
        let (start_date, end_date) = OpenMeteoClient::requested_dates(ts);
        assert_eq!(start_date.to_string(), "2024-06-01");
        assert_eq!(end_date.to_string(), end);
    }

    proptest! {
        #[test]
        fn prop_requested_dates_cover_every_step(minutes in 0i64..(7 * 24 * 60)) {
            let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
            let ts = floor_to_step(base + TimeDelta::minutes(minutes));
            let (start_date, end_date) = OpenMeteoClient::requested_dates(ts);

            let last_step = ts + horizon() - step();
            let hour = TimeDelta::hours(1);
            let floor = last_step.duration_trunc(hour).unwrap();
            let ceil = if floor == last_step { floor } else { floor + hour };

            prop_assert_eq!(start_date, ts.date_naive());
            prop_assert!(ceil.date_naive() <= end_date);
        }
    }

    #[tokio::test]
    async fn test_get_nwp_requests_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("models", "gfs_seamless"))
            .and(query_param("hourly", HOURLY_VARIABLES))
            .respond_with(ResponseTemplate::new(200).set_body_json(body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenMeteoClient::new(&config(&server.uri(), &server.uri())).unwrap();
        let site = PvSite::new(51.75, -1.25, 1.25).unwrap();
        let dataset = client
            .get_nwp(&site, Utc::now(), NwpSource::Gfs)
            .await
            .unwrap();
        assert_eq!(dataset.points.len(), 3);
    }

    #[tokio::test]
    async fn test_get_nwp_surfaces_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .mount(&server)
            .await;

        let client = OpenMeteoClient::new(&config(&server.uri(), &server.uri())).unwrap();
        let site = PvSite::new(51.75, -1.25, 1.25).unwrap();
        let err = client
            .get_nwp(&site, Utc::now(), NwpSource::Icon)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad model"));
    }
}
