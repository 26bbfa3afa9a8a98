use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// External failure shape: a status and a `{"error": "<kind>"}` body.
/// Validation failures additionally carry a `fields` array.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn validation(fields: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": "validation_error", "fields": fields }),
        }
    }
}

impl From<ledger::Error> for ApiError {
    fn from(err: ledger::Error) -> Self {
        use ledger::Error as E;

        let status = match &err {
            E::InvalidAmount
            | E::InvalidCurrency
            | E::CurrenciesMustDiffer
            | E::CannotTransferToSelf
            | E::InsufficientFunds
            | E::AmountTooLarge
            | E::Validation(_) => StatusCode::BAD_REQUEST,
            E::InvalidCredentials => StatusCode::UNAUTHORIZED,
            E::Unauthorized => StatusCode::FORBIDDEN,
            E::UserNotFound | E::AccountNotFound | E::TransactionNotFound => {
                StatusCode::NOT_FOUND
            }
            E::UserExists | E::Conflict => StatusCode::CONFLICT,
            E::UniqueViolation(_) | E::Serialization(_) | E::ConnectionLost(_) | E::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::warn!(error = %err, "request failed");
        }

        // Engine-side validation failures carry their message; everything
        // else reports the stable kind.
        let message = match &err {
            E::Validation(msg) => msg.clone(),
            other => other.kind().to_string(),
        };

        Self::new(status, &message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
