use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, MedMatchError>;

#[derive(Debug, Error)]
pub enum MedMatchError {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("collaborator analysis failed: {0}")]
    Collaborator(String),

    #[error("cache persistence failed: {0}")]
    CachePersist(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub operation: String,
    pub trace_id: String,
}

impl MedMatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CatalogUnavailable(_) => "CATALOG_UNAVAILABLE",
            Self::Collaborator(_) => "COLLABORATOR_ERROR",
            Self::CachePersist(_) => "CACHE_PERSIST_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Csv(_) => "CSV_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_payload(&self, operation: impl Into<String>) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            operation: operation.into(),
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    pub(crate) fn mutex_poisoned(label: &str) -> Self {
        Self::Internal(format!("poisoned lock: {label}"))
    }
}
