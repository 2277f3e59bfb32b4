use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::domain::{PvHistory, PvObservation, PvSite};
use crate::inverters::enphase::{AuthorizationCodeSource, EnphaseClient};

#[async_trait]
pub trait PvHistoryProvider: Send + Sync {
    async fn make_pv_data(&self, site: &PvSite, ts: DateTime<Utc>) -> Result<PvHistory>;
}

/// Site without telemetry: the model runs on NWP alone
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPvHistory;

#[async_trait]
impl PvHistoryProvider for NoPvHistory {
    async fn make_pv_data(&self, site: &PvSite, _ts: DateTime<Utc>) -> Result<PvHistory> {
        Ok(PvHistory::empty(site))
    }
}

/// Seeds the history with one live Enphase reading taken at forecast time.
/// Runs the full OAuth2 grant on every call.
pub struct EnphasePvHistory {
    client: EnphaseClient,
    code_source: Arc<dyn AuthorizationCodeSource>,
    system_id: String,
}

impl EnphasePvHistory {
    pub fn new(
        client: EnphaseClient,
        code_source: Arc<dyn AuthorizationCodeSource>,
        system_id: String,
    ) -> Self {
        Self {
            client,
            code_source,
            system_id,
        }
    }
}

#[async_trait]
impl PvHistoryProvider for EnphasePvHistory {
    async fn make_pv_data(&self, site: &PvSite, ts: DateTime<Utc>) -> Result<PvHistory> {
        let reading = self
            .client
            .get_live_reading(&self.system_id, self.code_source.as_ref())
            .await?;

        info!(system_id = %self.system_id, power_w = reading.power_w, "seeding PV history");

        Ok(PvHistory {
            capacity_kwp: site.capacity_kwp(),
            observations: vec![PvObservation {
                time: ts,
                power_w: reading.power_w,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnphaseConfig, EnphaseCredentials};
    use crate::error::TelemetryError;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedRedirect;

    #[async_trait]
    impl AuthorizationCodeSource for FixedRedirect {
        async fn redirect_url(&self, _authorization_url: &str) -> Result<String, TelemetryError> {
            Ok("https://api.enphaseenergy.com/oauth/redirect_uri?code=one-time".to_string())
        }
    }

    #[tokio::test]
    async fn test_no_history_is_empty() {
        let site = PvSite::new(51.75, -1.25, 1.25).unwrap();
        let history = NoPvHistory.make_pv_data(&site, Utc::now()).await.unwrap();
        assert!(history.observations.is_empty());
        assert_eq!(history.capacity_kwp, 1.25);
    }

    #[tokio::test]
    async fn test_enphase_history_records_live_reading_at_ts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "t"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/systems/77/live_data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"current_power": {"power": 512.5}}),
            ))
            .mount(&server)
            .await;

        let config = EnphaseConfig {
            base_url: server.uri(),
            http_timeout_seconds: 5,
            system_id: Some("77".to_string()),
        };
        let credentials = EnphaseCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            api_key: "key".to_string(),
        };
        let provider = EnphasePvHistory::new(
            EnphaseClient::new(&config, credentials).unwrap(),
            Arc::new(FixedRedirect),
            "77".to_string(),
        );

        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let site = PvSite::new(51.75, -1.25, 1.25).unwrap();
        let history = provider.make_pv_data(&site, ts).await.unwrap();

        assert_eq!(
            history.observations,
            vec![PvObservation { time: ts, power_w: 512.5 }]
        );
    }
}
