use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::models::WeatherSnapshot;

/// Subset of the `OpenWeatherMap` current weather response.
#[derive(Debug, Deserialize)]
pub struct CurrentWeatherResponse {
    pub main: Option<MainReading>,
    pub weather: Option<Vec<Condition>>,
}

#[derive(Debug, Deserialize)]
pub struct MainReading {
    pub temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Condition {
    pub main: Option<String>,
    pub icon: Option<String>,
}

pub fn parse_current_weather(
    body: &str,
    date: NaiveDate,
    fetched_at: &str,
) -> Result<WeatherSnapshot, ProviderError> {
    let resp: CurrentWeatherResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    response_to_snapshot(resp, date, fetched_at)
}

/// Temperature comes from `main.temp`; condition and icon from the first
/// element of `weather`.
pub fn response_to_snapshot(
    resp: CurrentWeatherResponse,
    date: NaiveDate,
    fetched_at: &str,
) -> Result<WeatherSnapshot, ProviderError> {
    let temperature = resp
        .main
        .ok_or(ProviderError::MissingField("main"))?
        .temp
        .ok_or(ProviderError::MissingField("main.temp"))?;

    let first = resp
        .weather
        .and_then(|w| w.into_iter().next())
        .ok_or(ProviderError::NoConditions)?;

    let weather = first
        .main
        .filter(|m| !m.is_empty())
        .ok_or(ProviderError::MissingField("weather[0].main"))?;
    let icon = first
        .icon
        .filter(|i| !i.is_empty())
        .ok_or(ProviderError::MissingField("weather[0].icon"))?;

    Ok(WeatherSnapshot {
        date,
        weather,
        icon,
        temperature,
        fetched_at: fetched_at.to_string(),
    })
}
