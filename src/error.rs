use std::io;
use std::path::PathBuf;
use std::time::Duration;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use log::{error, warn};
use serde_json::json;
use thiserror::Error;

/// Failures reported by [`crate::gpio::PinController`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpioError {
    #[error("invalid direction")]
    InvalidDirection,
    #[error("invalid pin: {0}")]
    InvalidPin(i64),
    #[error("invalid value: {0}")]
    InvalidValue(i64),
    #[error("pin {0} already exported")]
    AlreadyExported(u32),
    #[error("pin {0} not exported")]
    NotExported(i64),
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl GpioError {
    /// True for failures caused by the request itself rather than the hardware.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, GpioError::Unknown(_))
    }
}

impl From<GatewayError> for GpioError {
    fn from(e: GatewayError) -> Self {
        GpioError::Unknown(e.to_string())
    }
}

/// Low-level control file failures. Opaque to the controller.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: unexpected content {content:?}", path.display())]
    Malformed { path: PathBuf, content: String },
    #[error("gpio{pin} did not appear within {waited:?}")]
    SettleTimeout { pin: u32, waited: Duration },
}

impl GatewayError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GatewayError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Gpio(#[from] GpioError),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),
    #[error("Profile error: {0}")]
    Profile(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Gpio(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Gpio(_)
            | AppError::Config(_)
            | AppError::Profile(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {self}");
        } else {
            warn!("request rejected: {self}");
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpio_kinds_map_to_client_or_server_errors() {
        let client = [
            GpioError::InvalidDirection,
            GpioError::InvalidPin(-1),
            GpioError::InvalidValue(2),
            GpioError::AlreadyExported(3),
            GpioError::NotExported(4),
        ];
        for e in client {
            assert_eq!(AppError::from(e).status_code(), StatusCode::BAD_REQUEST);
        }
        let unknown = AppError::from(GpioError::Unknown("boom".into()));
        assert_eq!(unknown.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn gateway_failures_become_unknown() {
        let e = GatewayError::SettleTimeout {
            pin: 7,
            waited: Duration::from_millis(200),
        };
        match GpioError::from(e) {
            GpioError::Unknown(msg) => assert!(msg.contains("gpio7")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
