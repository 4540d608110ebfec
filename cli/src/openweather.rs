use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::debug;

use crate::config::WeatherConfig;
use skydiary_core::error::ProviderError;
use skydiary_core::models::WeatherSnapshot;
use skydiary_core::openweather::parse_current_weather;
use skydiary_core::service::WeatherProvider;

pub struct OpenWeatherClient {
    client: reqwest::Client,
    rt: tokio::runtime::Handle,
    config: WeatherConfig,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(config: WeatherConfig, rt: tokio::runtime::Handle) -> Result<Self> {
        let api_key = config.api_key()?.to_string();
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "skydiary/{} (weather diary)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            rt,
            config,
            api_key,
        })
    }

    /// Current conditions for the configured city. The API has no notion of
    /// date, so the reading is stamped with `date` as given.
    pub async fn fetch_async(&self, date: NaiveDate) -> Result<WeatherSnapshot, ProviderError> {
        debug!(city = %self.config.city, %date, "Requesting current weather");
        let resp = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("q", self.config.city.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("lang", self.config.lang.as_str()),
            ])
            .send()
            .await
            // The URL carries the API key
            .map_err(|e| ProviderError::Request(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.without_url().to_string()))?;

        parse_current_weather(&body, date, &Local::now().to_rfc3339())
    }
}

impl WeatherProvider for OpenWeatherClient {
    fn fetch(&self, date: NaiveDate) -> Result<WeatherSnapshot, ProviderError> {
        self.rt.block_on(self.fetch_async(date))
    }
}
