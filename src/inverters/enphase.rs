//! Enphase Enlighten API v4 client
//!
//! Live production is only reachable through the OAuth2 Authorization Code
//! grant. The flow is modelled as a chain of states, each consumed to build
//! the next:
//!
//! `EnphaseClient` → [`AuthorizationRequested`] → [`TokenExchanged`] → [`LiveReading`]
//!
//! Nothing is cached: every reading re-runs the whole grant, and the access
//! token is dropped together with the [`TokenExchanged`] state.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{EnphaseConfig, EnphaseCredentials};
use crate::error::TelemetryError;

/// Redirect registered for Enphase developer applications
pub const REDIRECT_URI: &str = "https://api.enphaseenergy.com/oauth/redirect_uri";

/// Hands the authorization URL to whoever can authorize it and returns the
/// URL the browser was redirected to
#[async_trait]
pub trait AuthorizationCodeSource: Send + Sync {
    async fn redirect_url(&self, authorization_url: &str) -> Result<String, TelemetryError>;
}

/// Interactive source: prompts on stderr and reads the pasted redirect from stdin
pub struct StdinCodeSource;

#[async_trait]
impl AuthorizationCodeSource for StdinCodeSource {
    async fn redirect_url(&self, authorization_url: &str) -> Result<String, TelemetryError> {
        eprintln!("Please visit the following URL and authorize the application: {authorization_url}");
        eprintln!("After authorization, you will be redirected to a URL with the authorization code.");
        eprintln!("Please copy and paste the full redirect URL here:");

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stdin closed before a redirect URL was entered",
            )
            .into());
        }
        Ok(line.trim().to_string())
    }
}

/// Pull the `code` query parameter out of a pasted redirect URL
pub fn extract_authorization_code(redirect_url: &str) -> Result<String, TelemetryError> {
    let trimmed = redirect_url.trim();

    let code = match Url::parse(trimmed) {
        Ok(url) => url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned()),
        // Scheme-less redirect or a bare query string such as "?code=..."
        Err(_) => {
            let query = trimmed.split_once('?').map_or(trimmed, |(_, q)| q);
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == "code")
                .map(|(_, v)| v.into_owned())
        }
    };

    match code {
        Some(code) if !code.is_empty() => Ok(code),
        _ => Err(TelemetryError::MissingAuthorizationCode {
            redirect_url: trimmed.to_string(),
        }),
    }
}

/// Instantaneous production reported by the live-data endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReading {
    pub system_id: String,
    pub power_w: f64,
    pub fetched_at: DateTime<Utc>,
}

pub struct EnphaseClient {
    client: Client,
    base_url: String,
    credentials: EnphaseCredentials,
}

impl EnphaseClient {
    pub fn new(config: &EnphaseConfig, credentials: EnphaseCredentials) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Build the URL a human must visit to grant access. No network traffic.
    pub fn authorize(&self) -> AuthorizationRequested<'_> {
        let endpoint = format!("{}/oauth/authorize", self.base_url);
        let params = [
            ("response_type", "code"),
            ("client_id", self.credentials.client_id.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ];
        let url = match Url::parse_with_params(&endpoint, &params) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}?{}",
                endpoint,
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params)
                    .finish()
            ),
        };
        AuthorizationRequested { client: self, url }
    }

    /// Run the whole grant and read the current production of `system_id`
    pub async fn get_live_reading(
        &self,
        system_id: &str,
        code_source: &dyn AuthorizationCodeSource,
    ) -> Result<LiveReading, TelemetryError> {
        let requested = self.authorize();
        let redirect_url = code_source.redirect_url(requested.url()).await?;
        let exchanged = requested.exchange(&redirect_url).await?;
        exchanged.fetch_live_data(system_id).await
    }

    fn basic_credential(&self) -> String {
        let raw = format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        );
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }
}

/// Authorization URL built, waiting for the human to authorize it
pub struct AuthorizationRequested<'a> {
    client: &'a EnphaseClient,
    url: String,
}

impl<'a> AuthorizationRequested<'a> {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Extract the code from `redirect_url` and trade it for an access token.
    /// The code is single use, so a failure here means starting over.
    pub async fn exchange(self, redirect_url: &str) -> Result<TokenExchanged<'a>, TelemetryError> {
        let code = extract_authorization_code(redirect_url)?;
        let client = self.client;
        let url = format!("{}/oauth/token", client.base_url);

        info!("exchanging Enphase authorization code for an access token");

        let response = client
            .client
            .post(&url)
            .header(AUTHORIZATION, client.basic_credential())
            .query(&[
                ("grant_type", "authorization_code"),
                ("redirect_uri", REDIRECT_URI),
                ("code", code.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, "Enphase token endpoint rejected the authorization code");
            return Err(TelemetryError::TokenExchange { status, body });
        }

        let access_token = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("access_token")?.as_str().map(str::to_string));

        match access_token {
            Some(access_token) => {
                debug!("access token received");
                Ok(TokenExchanged {
                    client,
                    access_token,
                })
            }
            None => {
                warn!(%status, "Enphase token response has no access_token");
                Err(TelemetryError::TokenExchange { status, body })
            }
        }
    }
}

/// Holds a bearer token valid for a single live-data fetch
pub struct TokenExchanged<'a> {
    client: &'a EnphaseClient,
    access_token: String,
}

impl TokenExchanged<'_> {
    pub async fn fetch_live_data(self, system_id: &str) -> Result<LiveReading, TelemetryError> {
        let client = self.client;
        let url = format!("{}/api/v4/systems/{}/live_data", client.base_url, system_id);

        debug!(%system_id, "fetching Enphase live data");

        let response = client
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .header("key", client.credentials.api_key.as_str())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TelemetryError::LiveData { status, body });
        }

        let power_w = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.pointer("/current_power/power")?.as_f64());

        match power_w {
            Some(power_w) => {
                info!(%system_id, power_w, "Enphase live reading");
                Ok(LiveReading {
                    system_id: system_id.to_string(),
                    power_w,
                    fetched_at: Utc::now(),
                })
            }
            None => Err(TelemetryError::TelemetryParse { body }),
        }
    }
}
