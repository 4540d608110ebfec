use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One weather reading cached for a calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub date: NaiveDate,
    pub weather: String,
    pub icon: String,
    pub temperature: f64,
    #[serde(default)]
    pub fetched_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiaryEntry {
    pub id: i64,
    pub date: NaiveDate,
    pub weather: String,
    pub icon: String,
    pub temperature: f64,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Weather fields are copied from the snapshot, not referenced.
#[derive(Debug, Clone)]
pub struct NewDiaryEntry {
    pub date: NaiveDate,
    pub weather: String,
    pub icon: String,
    pub temperature: f64,
    pub text: String,
}

impl NewDiaryEntry {
    #[must_use]
    pub fn from_snapshot(snapshot: &WeatherSnapshot, text: &str) -> Self {
        Self {
            date: snapshot.date,
            weather: snapshot.weather.clone(),
            icon: snapshot.icon.clone(),
            temperature: snapshot.temperature,
            text: text.to_string(),
        }
    }
}

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| anyhow::anyhow!("Invalid date '{s}'. Use YYYY-MM-DD"))
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
