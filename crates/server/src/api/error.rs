use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use tripgate_core::errors::{ApplicationError, InterfaceError};

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn new(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        Self(error.into().into_interface(correlation_id))
    }

    pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn not_found(message: impl Into<String>, correlation_id: &str) -> Self {
        Self::new(ApplicationError::NotFound(message.into()), correlation_id)
    }

    pub fn forbidden(message: impl Into<String>, correlation_id: &str) -> Self {
        Self::new(ApplicationError::Forbidden(message.into()), correlation_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let correlation_id = self.0.correlation_id().to_string();

        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %self.0,
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %self.0,
                "request rejected"
            );
        }

        (status, Json(ErrorBody { error: self.0.public_message(), correlation_id })).into_response()
    }
}

/// Maps any error that lifts into [`ApplicationError`] onto an HTTP error for one request.
pub trait OrApiError<T> {
    fn or_api(self, correlation_id: &str) -> Result<T, ApiError>;
}

impl<T, E> OrApiError<T> for Result<T, E>
where
    E: Into<ApplicationError>,
{
    fn or_api(self, correlation_id: &str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::new(error, correlation_id))
    }
}
