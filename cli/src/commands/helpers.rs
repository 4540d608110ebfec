use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use skydiary_core::models::{DiaryEntry, format_date};

pub(crate) fn parse_date(date_str: Option<&str>) -> Result<NaiveDate> {
    let today = Local::now().date_naive();
    match date_str {
        None | Some("today") => Ok(today),
        Some("yesterday") => Ok(today - chrono::Duration::days(1)),
        Some("tomorrow") => Ok(today + chrono::Duration::days(1)),
        Some(s) => skydiary_core::models::parse_date(s).map_err(|_| {
            anyhow::anyhow!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
        }),
    }
}

pub(crate) fn print_entry_table(entries: &[DiaryEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weather")]
        weather: String,
        #[tabled(rename = "Temp (°C)")]
        temperature: String,
        #[tabled(rename = "Text")]
        text: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            id: e.id,
            date: format_date(e.date),
            weather: format!("{} ({})", e.weather, e.icon),
            temperature: format!("{:.1}", e.temperature),
            text: truncate(&e.text, 50),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or_default();
    if first_line.chars().count() <= max && first_line.len() == s.len() {
        first_line.to_string()
    } else if first_line.chars().count() <= max {
        format!("{first_line}...")
    } else {
        let end = first_line
            .char_indices()
            .nth(max - 3)
            .map_or(first_line.len(), |(i, _)| i);
        format!("{}...", &first_line[..end])
    }
}
