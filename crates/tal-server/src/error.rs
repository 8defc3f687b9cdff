use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tal_ledger::LedgerError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("ledger is in maintenance mode")]
    Maintenance,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("notification error: {0}")]
    Notify(#[from] tal_ledger::NotifyError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::Ledger(LedgerError::EntryNotFound(_)) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Ledger(LedgerError::Precondition { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Ledger(LedgerError::DuplicateEntry(_)) => StatusCode::CONFLICT,
            Self::Maintenance => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use tal_types::EntryId;

    use super::*;

    #[test]
    fn status_mapping() {
        let precondition = ServerError::from(LedgerError::Precondition {
            field: "subjectId",
            reason: "must not be blank",
        });
        assert_eq!(precondition.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::from(LedgerError::EntryNotFound(EntryId::new("TXN-1"))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::from(LedgerError::LockPoisoned("write")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ServerError::Maintenance.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
