use anyhow::{Context, Result};
use clap::Args;
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    /// Resolve the database location. `db_override` wins over the platform
    /// data directory.
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        let (data_dir, db_path) = if let Some(path) = db_override {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), PathBuf::from);
            (dir, path)
        } else {
            let proj_dirs = ProjectDirs::from("", "", "skydiary")
                .context("Could not determine home directory")?;
            let dir = proj_dirs.data_dir().to_path_buf();
            let db_path = dir.join("skydiary.db");
            (dir, db_path)
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config { db_path, data_dir })
    }
}

/// Settings for the `OpenWeatherMap` client. The API key is only required by
/// commands that may fetch weather.
#[derive(Clone, Args)]
pub struct WeatherConfig {
    /// `OpenWeatherMap` API key
    #[arg(long = "api-key", global = true, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// City whose current weather is recorded
    #[arg(long, global = true, env = "SKYDIARY_CITY", default_value = "Seoul")]
    pub city: String,
    /// Language for condition labels
    #[arg(long, global = true, env = "SKYDIARY_LANG", default_value = "kr")]
    pub lang: String,
    /// Current weather endpoint
    #[arg(long = "weather-url", global = true, env = "SKYDIARY_WEATHER_URL", default_value = DEFAULT_WEATHER_URL)]
    pub endpoint: String,
    /// Request timeout for the weather API, in seconds
    #[arg(long = "weather-timeout", global = true, env = "SKYDIARY_WEATHER_TIMEOUT", default_value_t = 10)]
    pub timeout_secs: u64,
}

impl WeatherConfig {
    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .context("No weather API key configured. Set OPENWEATHER_API_KEY or pass --api-key")
    }
}
