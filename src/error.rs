use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced by the forecast orchestrator
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Unsupported provider: {name}. Choose between {}", .allowed.join(", "))]
    UnsupportedProvider {
        name: String,
        allowed: Vec<&'static str>,
    },

    #[error("Malformed timestamp '{input}': {reason}")]
    MalformedTimestamp { input: String, reason: String },

    #[error("Invalid site: {0}")]
    InvalidSite(String),

    #[error("Incomplete forecast: expected {expected} points, provider produced {actual}")]
    IncompleteForecast { expected: usize, actual: usize },

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// NWP, PV history and model failures pass through untouched
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ForecastError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ForecastError::InvalidSite(errors.to_string())
    }
}

/// Failures of the Enphase OAuth2 flow and live-data fetch
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("No authorization code in redirect URL '{redirect_url}', restart the authorization")]
    MissingAuthorizationCode { redirect_url: String },

    #[error("Token exchange failed (HTTP {status}): {body}")]
    TokenExchange { status: StatusCode, body: String },

    #[error("Live data response lacks current_power.power: {body}")]
    TelemetryParse { body: String },

    #[error("Live data request failed (HTTP {status}): {body}")]
    LiveData { status: StatusCode, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
