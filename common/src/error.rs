use actix_web::{ResponseError, HttpResponse};
use std::net::AddrParseError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Cannot move from phase {from} to {to}")]
    PhaseTransition { from: String, to: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        FleetError::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::SerializationError(err.to_string())
    }
}

impl From<AddrParseError> for FleetError {
    fn from(err: AddrParseError) -> Self {
        FleetError::NetworkError(err.to_string())
    }
}

impl From<tungstenite::Error> for FleetError {
    fn from(err: tungstenite::Error) -> Self {
        FleetError::NetworkError(err.to_string())
    }
}

impl ResponseError for FleetError {
    fn error_response(&self) -> HttpResponse {
        let body = serde_json::json!({ "error": self.to_string() });
        match self {
            Self::NotFound(_) => HttpResponse::NotFound().json(body),
            Self::PhaseTransition { .. } => HttpResponse::Conflict().json(body),
            Self::ProtocolError(_) | Self::ConfigError(_) => HttpResponse::BadRequest().json(body),
            Self::NetworkError(_) |
            Self::SerializationError(_) |
            Self::InternalError(_) => {
                HttpResponse::InternalServerError().json(body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FleetError::NotFound("robot".into()).error_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FleetError::PhaseTransition { from: "lobby".into(), to: "ended".into() }
                .error_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            FleetError::ConfigError("bad".into()).error_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FleetError::NetworkError("down".into()).error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_error_converts_to_network() {
        let err: FleetError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, FleetError::NetworkError(_)));
    }
}
