use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, NaiveTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use skydiary_core::models::WeatherSnapshot;
use skydiary_core::service::{DiaryService, WeatherProvider};

/// Refreshes today's weather snapshot once a day at a fixed local time, so
/// diary writes usually hit the cache.
pub struct DailyRefresh {
    service: Arc<Mutex<DiaryService>>,
    weather: Arc<dyn WeatherProvider>,
    at: NaiveTime,
}

impl DailyRefresh {
    pub fn new(
        service: Arc<Mutex<DiaryService>>,
        weather: Arc<dyn WeatherProvider>,
        at: NaiveTime,
    ) -> Self {
        Self {
            service,
            weather,
            at,
        }
    }

    pub async fn run_once(&self) -> Result<WeatherSnapshot> {
        let today = Local::now().date_naive();
        let service = Arc::clone(&self.service);
        let weather = Arc::clone(&self.weather);
        let snapshot = tokio::task::spawn_blocking(move || -> skydiary_core::error::Result<_> {
            // Fetch before locking so diary requests keep flowing meanwhile
            let fetched = weather.fetch(today)?;
            let svc = service.lock().unwrap_or_else(PoisonError::into_inner);
            svc.store_refreshed_weather(today, &fetched)
        })
        .await
        .context("weather refresh task panicked")??;
        Ok(snapshot)
    }

    pub async fn run(self, token: CancellationToken) {
        loop {
            let wait = until_next(Local::now().naive_local(), self.at);
            info!(
                next_in_secs = wait.as_secs(),
                at = %self.at.format("%H:%M"),
                "Daily weather refresh scheduled"
            );
            tokio::select! {
                () = token.cancelled() => {
                    info!("Daily weather refresh shutting down...");
                    break;
                }
                () = tokio::time::sleep(wait) => {
                    match self.run_once().await {
                        Ok(snapshot) => info!(
                            date = %snapshot.date,
                            weather = %snapshot.weather,
                            temperature = snapshot.temperature,
                            "Daily weather refresh complete"
                        ),
                        Err(e) => error!("Daily weather refresh failed: {e:#}"),
                    }
                }
            }
        }
    }
}

/// Time left until the next `at` strictly after `now`.
pub fn until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let today_at = now.date().and_time(at);
    let next = if today_at > now {
        today_at
    } else {
        today_at + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or_default()
}

pub fn parse_refresh_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("Invalid refresh time '{s}'. Use HH:MM (24-hour)"))
}
