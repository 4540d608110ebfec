use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, params};

use crate::models::{DATE_FORMAT, DiaryEntry, NewDiaryEntry, WeatherSnapshot, format_date};

const DIARY_COLUMNS: &str = "id, date, weather, icon, temperature, text, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS diary (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL,
                    weather TEXT NOT NULL,
                    icon TEXT NOT NULL,
                    temperature REAL NOT NULL,
                    text TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_diary_date ON diary(date);

                CREATE TABLE IF NOT EXISTS date_weather (
                    date TEXT PRIMARY KEY,
                    weather TEXT NOT NULL,
                    icon TEXT NOT NULL,
                    temperature REAL NOT NULL,
                    fetched_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Run `f` inside one SQLite transaction. Any error rolls the whole
    /// operation back.
    pub fn in_transaction<T, E>(&self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    // --- Weather snapshots ---

    pub fn get_weather(&self, date: NaiveDate) -> Result<Option<WeatherSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, weather, icon, temperature, fetched_at
             FROM date_weather WHERE date = ?1",
        )?;
        let mut rows = stmt.query(params![format_date(date)])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::weather_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Store a snapshot unless one already exists for its date. Returns the
    /// row that ends up stored, which is the earlier one on conflict.
    pub fn insert_weather_if_absent(&self, snapshot: &WeatherSnapshot) -> Result<WeatherSnapshot> {
        self.conn.execute(
            "INSERT INTO date_weather (date, weather, icon, temperature, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(date) DO NOTHING",
            params![
                format_date(snapshot.date),
                snapshot.weather,
                snapshot.icon,
                snapshot.temperature,
                snapshot.fetched_at,
            ],
        )?;
        self.get_weather(snapshot.date)?
            .context("Weather snapshot not found after insert")
    }

    pub fn upsert_weather(&self, snapshot: &WeatherSnapshot) -> Result<WeatherSnapshot> {
        self.conn.execute(
            "INSERT INTO date_weather (date, weather, icon, temperature, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(date) DO UPDATE SET
                weather = excluded.weather,
                icon = excluded.icon,
                temperature = excluded.temperature,
                fetched_at = excluded.fetched_at",
            params![
                format_date(snapshot.date),
                snapshot.weather,
                snapshot.icon,
                snapshot.temperature,
                snapshot.fetched_at,
            ],
        )?;
        self.get_weather(snapshot.date)?
            .context("Weather snapshot not found after upsert")
    }

    pub fn count_weather(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM date_weather", [], |row| row.get(0))?;
        Ok(n)
    }

    fn weather_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeatherSnapshot> {
        Ok(WeatherSnapshot {
            date: Self::date_column(row, 0)?,
            weather: row.get(1)?,
            icon: row.get(2)?,
            temperature: row.get(3)?,
            fetched_at: row.get(4)?,
        })
    }

    // --- Diary entries ---

    pub fn insert_diary(&self, entry: &NewDiaryEntry) -> Result<DiaryEntry> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO diary (date, weather, icon, temperature, text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                format_date(entry.date),
                entry.weather,
                entry.icon,
                entry.temperature,
                entry.text,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_diary(id)
    }

    pub fn get_diary(&self, id: i64) -> Result<DiaryEntry> {
        self.conn
            .query_row(
                &format!("SELECT {DIARY_COLUMNS} FROM diary WHERE id = ?1"),
                params![id],
                Self::diary_from_row,
            )
            .context("Diary entry not found")
    }

    pub fn get_diaries_for_date(&self, date: NaiveDate) -> Result<Vec<DiaryEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DIARY_COLUMNS} FROM diary WHERE date = ?1 ORDER BY id"
        ))?;
        let entries = stmt
            .query_map(params![format_date(date)], Self::diary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries with `start <= date <= end`. ISO dates compare correctly as text.
    pub fn get_diaries_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DiaryEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DIARY_COLUMNS} FROM diary
             WHERE date BETWEEN ?1 AND ?2
             ORDER BY date, id"
        ))?;
        let entries = stmt
            .query_map(
                params![format_date(start), format_date(end)],
                Self::diary_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn update_diary_text(&self, id: i64, text: &str) -> Result<DiaryEntry> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE diary SET text = ?1, updated_at = ?2 WHERE id = ?3",
            params![text, now, id],
        )?;
        if rows == 0 {
            anyhow::bail!("Diary entry {id} not found");
        }
        self.get_diary(id)
    }

    pub fn delete_diaries_for_date(&self, date: NaiveDate) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM diary WHERE date = ?1", params![format_date(date)])?;
        Ok(rows)
    }

    fn diary_from_row(row: &rusqlite::Row) -> rusqlite::Result<DiaryEntry> {
        Ok(DiaryEntry {
            id: row.get(0)?,
            date: Self::date_column(row, 1)?,
            weather: row.get(2)?,
            icon: row.get(3)?,
            temperature: row.get(4)?,
            text: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let raw: String = row.get(idx)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }
}
