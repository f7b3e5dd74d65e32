use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use docseq::Error;
use serde::Serialize;

use crate::server::telemetry::increment_errors;

/// Generic text shown to callers for every transient or store failure. Store
/// details stay in the server log.
pub const RETRY_MESSAGE: &str = "could not complete operation, please retry";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    UnknownDomain(String),
    Generation(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Generation(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::UnknownDomain(domain) => (
                StatusCode::NOT_FOUND,
                "UNKNOWN_DOMAIN",
                format!("unknown document domain {domain:?}"),
            ),
            Self::Generation(err @ (Error::InvalidCount { .. } | Error::InvalidConfig { .. })) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", err.to_string())
            }
            Self::Generation(Error::ExhaustedRetries { .. } | Error::StoreUnavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "RETRY_LATER",
                RETRY_MESSAGE.to_string(),
            ),
            Self::Generation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                RETRY_MESSAGE.to_string(),
            ),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::UnknownDomain(_) => "unknown_domain",
            Self::Generation(Error::InvalidCount { .. }) => "invalid_count",
            Self::Generation(Error::InvalidConfig { .. }) => "invalid_config",
            Self::Generation(Error::ExhaustedRetries { .. }) => "exhausted_retries",
            Self::Generation(Error::StoreUnavailable(_)) => "store_unavailable",
            Self::Generation(Error::FormatOverflow { .. }) => "format_overflow",
            Self::Generation(_) => "other",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = self.parts();

        if status.is_server_error() {
            increment_errors(self.kind());

            #[cfg(feature = "tracing")]
            match &self {
                Self::Generation(err @ Error::FormatOverflow { .. }) => {
                    tracing::error!(error = %err, "tail width exhausted, widen the configured digits");
                }
                Self::Generation(err) => {
                    tracing::error!(error = %err, source = ?std::error::Error::source(err), "generation failed");
                }
                Self::UnknownDomain(_) => {}
            }
        }

        (status, Json(ErrorResponse { error, code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use docseq::StoreError;

    use super::*;

    #[test]
    fn maps_taxonomy_to_status() {
        let cases = [
            (ApiError::UnknownDomain("xx".into()), StatusCode::NOT_FOUND),
            (
                Error::InvalidCount { count: 0, max: 100 }.into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::ExhaustedRetries {
                    attempts: 5,
                    last: StoreError::Timeout(Duration::from_secs(10)),
                }
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::StoreUnavailable(StoreError::Unavailable("disk I/O error".into())).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::FormatOverflow { value: 10_000, width: 4 }.into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn store_text_never_reaches_the_caller() {
        let err: ApiError =
            Error::StoreUnavailable(StoreError::Unavailable("disk I/O error at /var/db".into()))
                .into();
        let (_, code, message) = err.parts();
        assert_eq!(code, "RETRY_LATER");
        assert_eq!(message, RETRY_MESSAGE);
    }
}
