use crate::core::transform;
use crate::domain::model::{Coordinates, ForecastSeries};
use crate::domain::ports::ForecastSource;
use crate::utils::error::{MeteogramError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL, USER_AGENT};
use reqwest::Client;

pub const FORECAST_ENDPOINT: &str = "https://api.met.no/weatherapi/locationforecast/2.0/compact";

/// Product token sent when no identifying User-Agent is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("meteogram/", env!("CARGO_PKG_VERSION"));

/// Forecast fetcher for the locationforecast `compact` product.
#[derive(Debug, Clone)]
pub struct ForecastClient {
    endpoint: String,
    user_agent: String,
    client: Client,
}

impl ForecastClient {
    pub fn new() -> Self {
        Self::with_endpoint(FORECAST_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            client: Client::new(),
        }
    }

    /// The forecast service asks clients to identify themselves with contact details.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for ForecastClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForecastSource for ForecastClient {
    async fn fetch_forecast(&self, coords: Coordinates) -> Result<ForecastSeries> {
        tracing::debug!(
            "Requesting forecast for {},{} from {}",
            coords.lat,
            coords.lon,
            self.endpoint
        );

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("lat", coords.lat.to_string()),
                ("lon", coords.lon.to_string()),
            ])
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-store")
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("Forecast response status: {}", status);
        if !status.is_success() {
            return Err(MeteogramError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let raw: serde_json::Value = serde_json::from_str(&body)?;

        let series = transform::transform(&raw).ok_or(MeteogramError::EmptyResult)?;
        tracing::debug!("Forecast decoded into {} points", series.points.len());
        Ok(series)
    }
}
