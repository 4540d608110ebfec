use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::scheduler::DailyRefresh;
use skydiary_core::error::DiaryError;
use skydiary_core::models::{DiaryEntry, WeatherSnapshot, parse_date};
use skydiary_core::service::{DiaryService, WeatherProvider};

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<DiaryService>>,
    weather: Arc<dyn WeatherProvider>,
}

// --- Request types ---

#[derive(Deserialize)]
struct DateQuery {
    date: String,
}

#[derive(Deserialize)]
struct DateTextQuery {
    date: String,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeQuery {
    start_date: String,
    end_date: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(msg) => {
                warn!("Request failed: {msg}");
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<DiaryError> for ApiError {
    fn from(err: DiaryError) -> Self {
        if err.is_client_error() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.into())
        }
    }
}

fn parse_query_date(s: &str) -> Result<NaiveDate, ApiError> {
    parse_date(s).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Service calls block on SQLite, so they run off the async workers. The
/// lock is held only for the duration of `f`.
async fn with_service<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&DiaryService) -> Result<T, DiaryError> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    let result = tokio::task::spawn_blocking(move || {
        let svc = service.lock().unwrap_or_else(PoisonError::into_inner);
        f(&svc)
    })
    .await
    .context("diary task panicked")?;
    Ok(result?)
}

/// Call the weather provider without holding the service lock, so other
/// requests keep running while the API answers.
async fn fetch_unlocked(state: &AppState, date: NaiveDate) -> Result<WeatherSnapshot, ApiError> {
    let weather = Arc::clone(&state.weather);
    let fetched = tokio::task::spawn_blocking(move || weather.fetch(date))
        .await
        .context("weather fetch task panicked")?;
    Ok(fetched.map_err(DiaryError::from)?)
}

// --- Handlers ---

async fn create_diary(
    State(state): State<AppState>,
    Query(q): Query<DateTextQuery>,
) -> Result<StatusCode, ApiError> {
    let date = parse_query_date(&q.date)?;
    let cached = with_service(&state, move |svc| svc.get_cached_weather(date)).await?;
    let snapshot = match cached {
        Some(snapshot) => snapshot,
        None => fetch_unlocked(&state, date).await?,
    };
    let entry = with_service(&state, move |svc| {
        svc.create_diary_with_weather(date, &snapshot, &q.text)
    })
    .await?;
    info!(id = entry.id, %date, "Diary entry created");
    Ok(StatusCode::CREATED)
}

async fn read_diary(
    State(state): State<AppState>,
    Query(q): Query<DateQuery>,
) -> Result<Json<Vec<DiaryEntry>>, ApiError> {
    let date = parse_query_date(&q.date)?;
    let entries = with_service(&state, move |svc| svc.read_diary(date)).await?;
    Ok(Json(entries))
}

async fn read_diaries(
    State(state): State<AppState>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Vec<DiaryEntry>>, ApiError> {
    let start = parse_query_date(&q.start_date)?;
    let end = parse_query_date(&q.end_date)?;
    let entries = with_service(&state, move |svc| svc.read_diaries(start, end)).await?;
    Ok(Json(entries))
}

async fn update_diary(
    State(state): State<AppState>,
    Query(q): Query<DateTextQuery>,
) -> Result<StatusCode, ApiError> {
    let date = parse_query_date(&q.date)?;
    with_service(&state, move |svc| svc.update_diary(date, &q.text)).await?;
    Ok(StatusCode::OK)
}

async fn delete_diary(
    State(state): State<AppState>,
    Query(q): Query<DateQuery>,
) -> Result<StatusCode, ApiError> {
    let date = parse_query_date(&q.date)?;
    let removed = with_service(&state, move |svc| svc.delete_diary(date)).await?;
    info!(%date, removed, "Diary entries deleted");
    Ok(StatusCode::OK)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/create/diary", post(create_diary))
        .route("/read/diary", get(read_diary))
        .route("/read/diaries", get(read_diaries))
        .route("/update/diary", put(update_diary))
        .route("/delete/diary", delete(delete_diary))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: DiaryService,
    weather: Arc<dyn WeatherProvider>,
    port: u16,
    bind: &str,
    refresh_at: Option<NaiveTime>,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        weather,
    };

    let cancel_token = CancellationToken::new();

    if let Some(at) = refresh_at {
        let job = DailyRefresh::new(
            Arc::clone(&state.service),
            Arc::clone(&state.weather),
            at,
        );
        tokio::spawn(job.run(cancel_token.child_token()));
    } else {
        warn!("Daily weather refresh disabled; snapshots are fetched on first write only");
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, stopping background tasks...");
    cancel_token.cancel();
}
