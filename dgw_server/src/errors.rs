use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use dgw_engine::{traits::StoreError, GatewayError};
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("Could not read request: {0}")]
    InvalidRequestBody(String),
    #[error("No request signature was provided")]
    MissingSignature,
    #[error("The request signature is invalid")]
    InvalidSignature,
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    /// The error name reported to clients. Token faults are all reported as `invalid_token`.
    pub fn error_name(&self) -> &'static str {
        match self {
            Self::Gateway(e) if e.is_token_fault() => "invalid_token",
            Self::Gateway(e) => e.kind(),
            Self::InvalidRequestBody(_) => "invalid_request",
            Self::MissingSignature | Self::InvalidSignature => "invalid_signature",
            Self::InitializeError(_) | Self::ConfigurationError(_) => "configuration_error",
            Self::IOError(_) | Self::Unspecified(_) => "internal_error",
        }
    }

    /// The specific failure behind the error name
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Gateway(e) => e.kind(),
            Self::MissingSignature => "missing_signature",
            _ => self.error_name(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(e) if e.is_retryable())
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        Self::Gateway(e.into())
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Gateway(e) => StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingSignature | Self::InvalidSignature => StatusCode::FORBIDDEN,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ Request failed with {status}. {self}");
        }
        let body = json!({
            "ok": false,
            "error": self.error_name(),
            "reason": self.reason(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });
        HttpResponse::build(status).insert_header(ContentType::json()).body(body.to_string())
    }
}
