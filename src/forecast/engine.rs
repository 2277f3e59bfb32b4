use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::Validate;

use super::timestamp::resolve_start;
use super::window::ForecastWindow;
use super::{GeometryModel, NwpProvider, PvHistoryProvider, WeatherDrivenModel};
use crate::domain::{ForecastRequest, ForecastTime, NwpSource, PowerSeries, ProviderKind, PvSite};
use crate::error::ForecastError;

/// Stateless forecast orchestrator: resolves the start, dispatches to the
/// requested provider and windows its output
pub struct ForecastEngine {
    pub nwp: Arc<dyn NwpProvider>,
    pub pv_history: Arc<dyn PvHistoryProvider>,
    pub weather_model: Arc<dyn WeatherDrivenModel>,
    pub geometry_model: Arc<dyn GeometryModel>,
}

impl ForecastEngine {
    pub fn new(
        nwp: Arc<dyn NwpProvider>,
        pv_history: Arc<dyn PvHistoryProvider>,
        weather_model: Arc<dyn WeatherDrivenModel>,
        geometry_model: Arc<dyn GeometryModel>,
    ) -> Self {
        Self {
            nwp,
            pv_history,
            weather_model,
            geometry_model,
        }
    }

    /// Forecast `site` for 48 hours with the provider named `provider_name`.
    ///
    /// Returns `Ok(None)` when the geometry-driven model has no result.
    pub async fn run_forecast(
        &self,
        site: &PvSite,
        provider_name: &str,
        ts: Option<ForecastTime>,
        nwp_source: Option<NwpSource>,
    ) -> Result<Option<PowerSeries>, ForecastError> {
        let provider = ProviderKind::from_str(provider_name).map_err(|_| {
            ForecastError::UnsupportedProvider {
                name: provider_name.to_string(),
                allowed: ProviderKind::names(),
            }
        })?;

        let request = ForecastRequest {
            site: site.clone(),
            provider,
            timestamp: ts,
            nwp_source: nwp_source.unwrap_or_default(),
        };
        self.run(&request).await
    }

    pub async fn run(&self, request: &ForecastRequest) -> Result<Option<PowerSeries>, ForecastError> {
        self.run_at(request, Utc::now()).await
    }

    /// As [`Self::run`], with an explicit "now" for absent timestamps
    #[instrument(skip_all, fields(provider = %request.provider, nwp_source = %request.nwp_source))]
    pub async fn run_at(
        &self,
        request: &ForecastRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<PowerSeries>, ForecastError> {
        request.site.validate()?;
        let start = resolve_start(request.timestamp.as_ref(), now)?;
        let window = ForecastWindow::starting_at(start);
        debug!(%start, end = %window.end, "resolved forecast window");

        let series = match request.provider {
            ProviderKind::WeatherDriven => {
                Some(self.weather_driven(&request.site, request.nwp_source, window).await?)
            }
            ProviderKind::GeometryDriven => self.geometry_driven(&request.site, window).await?,
        };

        match &series {
            Some(s) => info!(
                points = s.len(),
                max_wh = s.max_power_wh().unwrap_or(0.0),
                "forecast finished"
            ),
            None => info!("provider returned no forecast"),
        }
        Ok(series)
    }

    async fn weather_driven(
        &self,
        site: &PvSite,
        nwp_source: NwpSource,
        window: ForecastWindow,
    ) -> Result<PowerSeries, ForecastError> {
        let nwp = self.nwp.get_nwp(site, window.start, nwp_source).await?;
        let pv_history = self.pv_history.make_pv_data(site, window.start).await?;

        let raw = self
            .weather_model
            .predict(nwp_source, &nwp, &pv_history, window.start)
            .await?;
        window.apply_complete(raw)
    }

    async fn geometry_driven(
        &self,
        site: &PvSite,
        window: ForecastWindow,
    ) -> Result<Option<PowerSeries>, ForecastError> {
        let raw = self
            .geometry_model
            .predict_power_output(
                site.latitude(),
                site.longitude(),
                window.start.date_naive(),
                site.capacity_kwp(),
                site.orientation(),
                site.tilt(),
            )
            .await?;
        Ok(raw.map(|points| window.apply(points)))
    }
}
