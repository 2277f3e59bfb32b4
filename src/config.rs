use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Serialized, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{NwpSource, PvSite};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub site: PvSite,
    pub forecast: ForecastConfig,
    pub nwp: NwpConfig,
    pub geometry: GeometryConfig,
    pub enphase: EnphaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Provider name, parsed at dispatch time
    pub provider: String,
    pub nwp_source: NwpSource,
    /// ISO-8601 start; absent means now
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NwpConfig {
    pub base_url: String,
    pub archive_base_url: String,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Native output step of the clear-sky model
    pub step_minutes: u32,
    /// Combined inverter, wiring and soiling losses (0.0-1.0)
    pub system_efficiency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnphaseConfig {
    pub base_url: String,
    pub http_timeout_seconds: u64,
    /// When set, the weather-driven path seeds PV history with a live reading
    pub system_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: PvSite::default(),
            forecast: ForecastConfig {
                provider: "weather-driven".to_string(),
                nwp_source: NwpSource::Icon,
                timestamp: None,
            },
            nwp: NwpConfig {
                base_url: "https://api.open-meteo.com".to_string(),
                archive_base_url: "https://historical-forecast-api.open-meteo.com".to_string(),
                http_timeout_seconds: 30,
            },
            geometry: GeometryConfig {
                step_minutes: 15,
                system_efficiency: 0.86,
            },
            enphase: EnphaseConfig {
                base_url: "https://api.enphaseenergy.com".to_string(),
                http_timeout_seconds: 30,
                system_id: None,
            },
        }
    }
}

impl Config {
    /// Built-in defaults, then `config/default.toml`, then `PVF__` variables
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("PVF__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }
}

/// Enphase developer application credentials. Read once, never mutated.
#[derive(Clone)]
pub struct EnphaseCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub api_key: String,
}

impl EnphaseCredentials {
    /// Read `ENPHASE_CLIENT_ID`, `ENPHASE_CLIENT_SECRET` and `ENPHASE_API_KEY`,
    /// after loading a `.env` file if one exists
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            client_id: std::env::var("ENPHASE_CLIENT_ID").context("ENPHASE_CLIENT_ID not set")?,
            client_secret: std::env::var("ENPHASE_CLIENT_SECRET")
                .context("ENPHASE_CLIENT_SECRET not set")?,
            api_key: std::env::var("ENPHASE_API_KEY").context("ENPHASE_API_KEY not set")?,
        })
    }
}

impl fmt::Debug for EnphaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnphaseCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_key", &"<redacted>")
            .finish()
    }
}
