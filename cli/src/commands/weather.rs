use anyhow::Result;

use skydiary_core::models::{WeatherSnapshot, format_date};
use skydiary_core::service::{DiaryService, WeatherProvider};

use super::helpers::parse_date;

/// Show the snapshot for a date, fetching it on a cache miss. `refresh`
/// replaces it with a fresh reading, like the daily job does. `weather` is
/// only built when a fetch is needed.
pub(crate) fn cmd_weather<P: WeatherProvider>(
    svc: &DiaryService,
    weather: impl FnOnce() -> Result<P>,
    date: Option<&str>,
    refresh: bool,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let cached = if refresh {
        None
    } else {
        svc.get_cached_weather(date)?
    };
    let snapshot = match cached {
        Some(snapshot) => snapshot,
        None if refresh => svc.refresh_weather(&weather()?, date)?,
        None => svc.resolve_weather(&weather()?, date)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }

    Ok(())
}

fn print_snapshot(s: &WeatherSnapshot) {
    println!(
        "{}: {} ({}), {:.1}°C",
        format_date(s.date),
        s.weather,
        s.icon,
        s.temperature
    );
    if !s.fetched_at.is_empty() {
        println!("  Fetched at {}", s.fetched_at);
    }
}
