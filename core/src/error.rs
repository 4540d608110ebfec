use chrono::NaiveDate;
use thiserror::Error;

/// Failure while fetching or decoding a reading from the weather API.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to reach weather API: {0}")]
    Request(String),
    #[error("Weather API returned status {status}")]
    Status { status: u16 },
    #[error("Failed to parse weather response: {0}")]
    Parse(String),
    #[error("Weather response is missing '{0}'")]
    MissingField(&'static str),
    #[error("Weather response contains no conditions")]
    NoConditions,
}

#[derive(Error, Debug)]
pub enum DiaryError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DiaryError {
    /// Errors caused by the request rather than by the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Provider(_) | Self::InvalidRange { .. }
        )
    }
}

pub type Result<T, E = DiaryError> = std::result::Result<T, E>;
