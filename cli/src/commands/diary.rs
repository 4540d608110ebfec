use anyhow::Result;

use skydiary_core::error::DiaryError;
use skydiary_core::models::format_date;
use skydiary_core::service::{DiaryService, WeatherProvider};

use super::helpers::{json_error, parse_date, print_entry_table};

/// `weather` is only built when the date has no cached snapshot.
pub(crate) fn cmd_write<P: WeatherProvider>(
    svc: &DiaryService,
    weather: impl FnOnce() -> Result<P>,
    date: Option<&str>,
    text: &str,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let entry = match svc.get_cached_weather(date)? {
        Some(cached) => svc.create_diary_with_weather(date, &cached, text)?,
        None => svc.create_diary(&weather()?, date, text)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Wrote entry {} for {} ({}, {:.1}°C)",
            entry.id,
            format_date(entry.date),
            entry.weather,
            entry.temperature
        );
    }

    Ok(())
}

pub(crate) fn cmd_read(svc: &DiaryService, date: Option<&str>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let entries = svc.read_diary(date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!(
            "No diary entries for {}. Use `skydiary write` to add one.",
            format_date(date)
        );
    } else {
        for e in &entries {
            println!(
                "#{}  {}  {} {} {:.1}°C",
                e.id,
                format_date(e.date),
                e.weather,
                e.icon,
                e.temperature
            );
            println!("{}\n", e.text);
        }
    }

    Ok(())
}

pub(crate) fn cmd_range(svc: &DiaryService, start: &str, end: &str, json: bool) -> Result<()> {
    let start = parse_date(Some(start))?;
    let end = parse_date(Some(end))?;
    let entries = svc.read_diaries(start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!(
            "No diary entries between {} and {}",
            format_date(start),
            format_date(end)
        );
    } else {
        print_entry_table(&entries);
    }

    Ok(())
}

pub(crate) fn cmd_edit(svc: &DiaryService, date: Option<&str>, text: &str, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    match svc.update_diary(date, text) {
        Ok(entry) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("Updated entry {} for {}", entry.id, format_date(entry.date));
            }
            Ok(())
        }
        Err(DiaryError::NotFound(msg)) if json => {
            println!("{}", json_error(&msg));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn cmd_delete(svc: &DiaryService, date: Option<&str>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let removed = svc.delete_diary(date)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": format_date(date), "deleted": removed })
        );
    } else {
        println!("Deleted {removed} entries for {}", format_date(date));
    }

    Ok(())
}
