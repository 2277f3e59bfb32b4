use anyhow::{Context, Result};
use pv_forecast::config::{Config, EnphaseCredentials};
use pv_forecast::forecast::{
    ClearSkyModel, EnphasePvHistory, ForecastEngine, IrradianceModel, NoPvHistory, OpenMeteoClient,
    PvHistoryProvider,
};
use pv_forecast::inverters::{EnphaseClient, StdinCodeSource};
use pv_forecast::telemetry::init_tracing;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    let command = std::env::args().nth(1).unwrap_or_else(|| "forecast".to_string());

    match command.as_str() {
        "forecast" => forecast(&cfg).await,
        "live" => live(&cfg).await,
        other => anyhow::bail!("unknown command '{other}', expected 'forecast' or 'live'"),
    }
}

async fn forecast(cfg: &Config) -> Result<()> {
    let pv_history: Arc<dyn PvHistoryProvider> = match &cfg.enphase.system_id {
        Some(system_id) => {
            let client = EnphaseClient::new(&cfg.enphase, EnphaseCredentials::from_env()?)?;
            Arc::new(EnphasePvHistory::new(
                client,
                Arc::new(StdinCodeSource),
                system_id.clone(),
            ))
        }
        None => Arc::new(NoPvHistory),
    };

    let engine = ForecastEngine::new(
        Arc::new(OpenMeteoClient::new(&cfg.nwp)?),
        pv_history,
        Arc::new(IrradianceModel {
            system_efficiency: cfg.geometry.system_efficiency,
            ..Default::default()
        }),
        Arc::new(ClearSkyModel::new(&cfg.geometry)),
    );

    info!(
        provider = %cfg.forecast.provider,
        nwp_source = %cfg.forecast.nwp_source,
        "running forecast for ({}, {})",
        cfg.site.latitude(),
        cfg.site.longitude()
    );

    let series = engine
        .run_forecast(
            &cfg.site,
            &cfg.forecast.provider,
            cfg.forecast.timestamp.clone().map(Into::into),
            Some(cfg.forecast.nwp_source),
        )
        .await?;

    match series {
        Some(series) => println!("{}", serde_json::to_string_pretty(&series.to_points())?),
        None => warn!("provider produced no forecast"),
    }
    Ok(())
}

async fn live(cfg: &Config) -> Result<()> {
    let system_id = cfg
        .enphase
        .system_id
        .as_deref()
        .context("enphase.system_id must be set for live readings")?;

    let client = EnphaseClient::new(&cfg.enphase, EnphaseCredentials::from_env()?)?;
    let reading = client.get_live_reading(system_id, &StdinCodeSource).await?;

    println!("{}", serde_json::to_string_pretty(&reading)?);
    Ok(())
}
