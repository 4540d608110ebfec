use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{DiaryError, ProviderError, Result};
use crate::models::{DiaryEntry, NewDiaryEntry, WeatherSnapshot};

/// Source of current weather readings.
///
/// The CLI implements this over reqwest. Called synchronously; async callers
/// should invoke `DiaryService` methods from a blocking thread.
pub trait WeatherProvider: Send + Sync {
    /// Fetch a reading stamped with `date`.
    fn fetch(&self, date: NaiveDate) -> Result<WeatherSnapshot, ProviderError>;
}

pub struct DiaryService {
    db: Database,
}

impl DiaryService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    // --- Weather ---

    /// Cache-or-fetch: return the stored snapshot for `date`, or call the
    /// provider once and store its reading. The provider is called outside
    /// any transaction.
    pub fn resolve_weather(
        &self,
        provider: &dyn WeatherProvider,
        date: NaiveDate,
    ) -> Result<WeatherSnapshot> {
        if let Some(cached) = self.get_cached_weather(date)? {
            debug!(%date, "Weather cache hit");
            return Ok(cached);
        }

        info!(%date, "Weather cache miss, calling provider");
        let fetched = provider.fetch(date)?;
        self.store_fetched_weather(date, &fetched)
    }

    pub fn get_cached_weather(&self, date: NaiveDate) -> Result<Option<WeatherSnapshot>> {
        Ok(self.db.get_weather(date)?)
    }

    /// Store a reading fetched for `date` unless one is already cached.
    /// Returns the snapshot that ends up stored.
    pub fn store_fetched_weather(
        &self,
        date: NaiveDate,
        fetched: &WeatherSnapshot,
    ) -> Result<WeatherSnapshot> {
        let snapshot = stamped(fetched, date);
        Ok(self
            .db
            .in_transaction(|db| db.insert_weather_if_absent(&snapshot))?)
    }

    /// Fetch a fresh reading for `date` and store it, replacing any snapshot
    /// cached earlier.
    pub fn refresh_weather(
        &self,
        provider: &dyn WeatherProvider,
        date: NaiveDate,
    ) -> Result<WeatherSnapshot> {
        let fetched = provider.fetch(date)?;
        self.store_refreshed_weather(date, &fetched)
    }

    /// Upsert a reading fetched for `date`.
    pub fn store_refreshed_weather(
        &self,
        date: NaiveDate,
        fetched: &WeatherSnapshot,
    ) -> Result<WeatherSnapshot> {
        let snapshot = stamped(fetched, date);
        let stored = self.db.in_transaction(|db| db.upsert_weather(&snapshot))?;
        info!(%date, weather = %stored.weather, temperature = stored.temperature, "Weather snapshot refreshed");
        Ok(stored)
    }

    // --- Diary ---

    pub fn create_diary(
        &self,
        provider: &dyn WeatherProvider,
        date: NaiveDate,
        text: &str,
    ) -> Result<DiaryEntry> {
        let snapshot = match self.get_cached_weather(date)? {
            Some(cached) => {
                debug!(%date, "Weather cache hit");
                cached
            }
            None => {
                info!(%date, "Weather cache miss, calling provider");
                provider.fetch(date)?
            }
        };
        self.create_diary_with_weather(date, &snapshot, text)
    }

    /// Write an entry for `date` using `fetched` unless a snapshot is already
    /// cached for that date, in which case the cached one wins. The snapshot
    /// and the entry are stored in one transaction.
    pub fn create_diary_with_weather(
        &self,
        date: NaiveDate,
        fetched: &WeatherSnapshot,
        text: &str,
    ) -> Result<DiaryEntry> {
        let snapshot = stamped(fetched, date);
        self.db.in_transaction(|db| -> Result<DiaryEntry> {
            let stored = db.insert_weather_if_absent(&snapshot)?;
            let entry = db.insert_diary(&NewDiaryEntry {
                date,
                ..NewDiaryEntry::from_snapshot(&stored, text)
            })?;
            debug!(id = entry.id, %date, "Diary entry created");
            Ok(entry)
        })
    }

    pub fn read_diary(&self, date: NaiveDate) -> Result<Vec<DiaryEntry>> {
        Ok(self.db.get_diaries_for_date(date)?)
    }

    pub fn read_diaries(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DiaryEntry>> {
        if start > end {
            return Err(DiaryError::InvalidRange { start, end });
        }
        Ok(self.db.get_diaries_between(start, end)?)
    }

    /// Overwrite the text of the first entry (lowest id) written on `date`.
    pub fn update_diary(&self, date: NaiveDate, text: &str) -> Result<DiaryEntry> {
        self.db.in_transaction(|db| -> Result<DiaryEntry> {
            let first = db
                .get_diaries_for_date(date)?
                .into_iter()
                .next()
                .ok_or_else(|| DiaryError::NotFound(format!("No diary entry for {date}")))?;
            Ok(db.update_diary_text(first.id, text)?)
        })
    }

    /// Remove every entry for `date`. Deleting an empty date is not an error.
    pub fn delete_diary(&self, date: NaiveDate) -> Result<usize> {
        let removed = self
            .db
            .in_transaction(|db| db.delete_diaries_for_date(date).map_err(DiaryError::from))?;
        debug!(%date, removed, "Diary entries deleted");
        Ok(removed)
    }
}

/// The snapshot is always keyed by the requested date, whatever the provider
/// stamped on it.
fn stamped(fetched: &WeatherSnapshot, date: NaiveDate) -> WeatherSnapshot {
    WeatherSnapshot {
        date,
        ..fetched.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProvider {
        calls: AtomicUsize,
        readings: Mutex<Vec<(&'static str, &'static str, f64)>>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self::with_readings(vec![("Clear", "01d", 22.5)])
        }

        /// Each fetch pops the next reading; the last one repeats.
        fn with_readings(readings: Vec<(&'static str, &'static str, f64)>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                readings: Mutex::new(readings),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl WeatherProvider for MockProvider {
        fn fetch(&self, date: NaiveDate) -> Result<WeatherSnapshot, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut readings = self.readings.lock().unwrap();
            let (weather, icon, temperature) = if readings.len() > 1 {
                readings.remove(0)
            } else {
                readings[0]
            };
            Ok(WeatherSnapshot {
                date,
                weather: weather.to_string(),
                icon: icon.to_string(),
                temperature,
                fetched_at: "2024-06-15T01:00:00+09:00".to_string(),
            })
        }
    }

    struct FailingProvider;

    impl WeatherProvider for FailingProvider {
        fn fetch(&self, _date: NaiveDate) -> Result<WeatherSnapshot, ProviderError> {
            Err(ProviderError::Request("connection refused".to_string()))
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_resolve_weather_fetches_once_then_caches() {
        let svc = DiaryService::new_in_memory().unwrap();
        let provider = MockProvider::new();

        let first = svc.resolve_weather(&provider, date(15)).unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(first.weather, "Clear");
        assert_eq!(svc.get_cached_weather(date(15)).unwrap(), Some(first.clone()));

        let second = svc.resolve_weather(&provider, date(15)).unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(second, first);
    }

    #[test]
    fn test_resolve_weather_provider_failure_stores_nothing() {
        let svc = DiaryService::new_in_memory().unwrap();
        let err = svc.resolve_weather(&FailingProvider, date(15)).unwrap_err();
        assert!(matches!(err, DiaryError::Provider(ProviderError::Request(_))));
        assert!(svc.get_cached_weather(date(15)).unwrap().is_none());
    }

    #[test]
    fn test_create_then_read() {
        let svc = DiaryService::new_in_memory().unwrap();
        let provider = MockProvider::new();

        let created = svc.create_diary(&provider, date(15), "hello").unwrap();
        let snapshot = svc.get_cached_weather(date(15)).unwrap().unwrap();

        let entries = svc.read_diary(date(15)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], created);
        assert_eq!(entries[0].text, "hello");
        assert_eq!(entries[0].weather, snapshot.weather);
        assert_eq!(entries[0].icon, snapshot.icon);
        assert!((entries[0].temperature - snapshot.temperature).abs() < f64::EPSILON);
    }

    #[test]
    fn test_create_fails_when_provider_fails() {
        let svc = DiaryService::new_in_memory().unwrap();
        let err = svc
            .create_diary(&FailingProvider, date(15), "hello")
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(svc.read_diary(date(15)).unwrap().is_empty());
    }

    #[test]
    fn test_create_uses_cached_snapshot_without_provider() {
        let svc = DiaryService::new_in_memory().unwrap();
        svc.refresh_weather(&MockProvider::new(), date(15)).unwrap();

        // Provider is down, but the cached snapshot covers the write
        let entry = svc.create_diary(&FailingProvider, date(15), "offline").unwrap();
        assert_eq!(entry.weather, "Clear");
    }

    #[test]
    fn test_two_entries_same_date_share_weather() {
        let svc = DiaryService::new_in_memory().unwrap();
        let provider = MockProvider::with_readings(vec![("Rain", "10d", 14.0), ("Clear", "01d", 30.0)]);

        svc.create_diary(&provider, date(15), "first").unwrap();
        svc.create_diary(&provider, date(15), "second").unwrap();
        assert_eq!(provider.calls(), 1);

        let entries = svc.read_diary(date(15)).unwrap();
        assert_eq!(entries.len(), 2);
        let mut texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        texts.sort_unstable();
        assert_eq!(texts, vec!["first", "second"]);
        for e in &entries {
            assert_eq!(e.weather, "Rain");
            assert_eq!(e.icon, "10d");
            assert!((e.temperature - 14.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_read_diaries_inclusive_range() {
        let svc = DiaryService::new_in_memory().unwrap();
        let provider = MockProvider::new();
        for d in [1, 5, 10, 11, 20] {
            svc.create_diary(&provider, date(d), &format!("day {d}")).unwrap();
        }

        let entries = svc.read_diaries(date(5), date(11)).unwrap();
        let days: Vec<NaiveDate> = entries.iter().map(|e| e.date).collect();
        assert_eq!(days, vec![date(5), date(10), date(11)]);

        let single = svc.read_diaries(date(20), date(20)).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].text, "day 20");
    }

    #[test]
    fn test_read_diaries_reversed_range_rejected() {
        let svc = DiaryService::new_in_memory().unwrap();
        let err = svc.read_diaries(date(11), date(5)).unwrap_err();
        assert!(matches!(err, DiaryError::InvalidRange { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_update_missing_date_not_found() {
        let svc = DiaryService::new_in_memory().unwrap();
        let err = svc.update_diary(date(15), "new text").unwrap_err();
        assert!(matches!(err, DiaryError::NotFound(_)));
        assert_eq!(err.to_string(), "No diary entry for 2024-06-15");
    }

    #[test]
    fn test_update_changes_exactly_one_entry() {
        let svc = DiaryService::new_in_memory().unwrap();
        let provider = MockProvider::new();
        let a = svc.create_diary(&provider, date(15), "a").unwrap();
        let b = svc.create_diary(&provider, date(15), "b").unwrap();

        let updated = svc.update_diary(date(15), "new text").unwrap();
        assert_eq!(updated.id, a.id);
        assert_eq!(updated.weather, a.weather);
        assert_eq!(updated.icon, a.icon);

        let entries = svc.read_diary(date(15)).unwrap();
        let changed: Vec<&DiaryEntry> = entries.iter().filter(|e| e.text == "new text").collect();
        assert_eq!(changed.len(), 1);
        assert!(entries.iter().any(|e| e.id == b.id && e.text == "b"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let svc = DiaryService::new_in_memory().unwrap();
        let provider = MockProvider::new();
        svc.create_diary(&provider, date(15), "a").unwrap();
        svc.create_diary(&provider, date(15), "b").unwrap();
        svc.create_diary(&provider, date(16), "c").unwrap();

        assert_eq!(svc.delete_diary(date(15)).unwrap(), 2);
        assert!(svc.read_diary(date(15)).unwrap().is_empty());
        assert_eq!(svc.read_diary(date(16)).unwrap().len(), 1);

        assert_eq!(svc.delete_diary(date(15)).unwrap(), 0);
    }

    #[test]
    fn test_refresh_overwrites_lazily_cached_snapshot() {
        let svc = DiaryService::new_in_memory().unwrap();
        let provider = MockProvider::with_readings(vec![("Mist", "50d", 12.0), ("Clear", "01d", 18.0)]);

        let lazy = svc.resolve_weather(&provider, date(15)).unwrap();
        assert_eq!(lazy.weather, "Mist");

        let refreshed = svc.refresh_weather(&provider, date(15)).unwrap();
        assert_eq!(refreshed.weather, "Clear");
        assert_eq!(svc.get_cached_weather(date(15)).unwrap(), Some(refreshed));
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_refresh_failure_keeps_existing_snapshot() {
        let svc = DiaryService::new_in_memory().unwrap();
        let cached = svc.resolve_weather(&MockProvider::new(), date(15)).unwrap();

        assert!(svc.refresh_weather(&FailingProvider, date(15)).is_err());
        assert_eq!(svc.get_cached_weather(date(15)).unwrap(), Some(cached));
    }

    #[test]
    fn test_entry_weather_not_linked_to_snapshot() {
        let svc = DiaryService::new_in_memory().unwrap();
        let provider = MockProvider::with_readings(vec![("Mist", "50d", 12.0), ("Clear", "01d", 18.0)]);

        svc.create_diary(&provider, date(15), "before refresh").unwrap();
        svc.refresh_weather(&provider, date(15)).unwrap();

        let entries = svc.read_diary(date(15)).unwrap();
        assert_eq!(entries[0].weather, "Mist");
    }

    /// Hands back readings stamped with a fixed date regardless of the request.
    struct MisdatedProvider;

    impl WeatherProvider for MisdatedProvider {
        fn fetch(&self, _date: NaiveDate) -> Result<WeatherSnapshot, ProviderError> {
            Ok(WeatherSnapshot {
                date: date(1),
                weather: "Snow".to_string(),
                icon: "13d".to_string(),
                temperature: -3.0,
                fetched_at: String::new(),
            })
        }
    }

    #[test]
    fn test_create_files_entry_under_requested_date() {
        let svc = DiaryService::new_in_memory().unwrap();

        let entry = svc.create_diary(&MisdatedProvider, date(15), "cold").unwrap();
        assert_eq!(entry.date, date(15));
        assert_eq!(entry.weather, "Snow");

        assert_eq!(svc.read_diary(date(15)).unwrap().len(), 1);
        assert!(svc.read_diary(date(1)).unwrap().is_empty());
        assert_eq!(svc.get_cached_weather(date(15)).unwrap().unwrap().date, date(15));
        assert!(svc.get_cached_weather(date(1)).unwrap().is_none());
    }

    #[test]
    fn test_resolve_and_refresh_key_snapshot_by_requested_date() {
        let svc = DiaryService::new_in_memory().unwrap();

        assert_eq!(svc.resolve_weather(&MisdatedProvider, date(15)).unwrap().date, date(15));
        assert_eq!(svc.refresh_weather(&MisdatedProvider, date(16)).unwrap().date, date(16));
        assert!(svc.get_cached_weather(date(1)).unwrap().is_none());
    }

    #[test]
    fn test_create_with_weather_prefers_cached_snapshot() {
        let svc = DiaryService::new_in_memory().unwrap();
        let cached = svc.resolve_weather(&MockProvider::new(), date(15)).unwrap();

        let late = WeatherSnapshot {
            date: date(15),
            weather: "Rain".to_string(),
            icon: "10d".to_string(),
            temperature: 11.0,
            fetched_at: String::new(),
        };
        let entry = svc.create_diary_with_weather(date(15), &late, "raced").unwrap();
        assert_eq!(entry.weather, cached.weather);
        assert_eq!(svc.get_cached_weather(date(15)).unwrap(), Some(cached));
    }

    #[test]
    fn test_create_with_weather_stores_snapshot_and_entry() {
        let svc = DiaryService::new_in_memory().unwrap();
        let fetched = MockProvider::new().fetch(date(15)).unwrap();

        let entry = svc.create_diary_with_weather(date(15), &fetched, "hello").unwrap();
        assert_eq!(entry.text, "hello");
        assert_eq!(svc.get_cached_weather(date(15)).unwrap(), Some(fetched));
    }
}
