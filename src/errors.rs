// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestyleError {
    #[error("Failed to create picker session (upstream status {status}): {body}")]
    SessionCreate { status: u16, body: String },

    #[error("Photo selection timed out")]
    PollTimeout,

    #[error("Failed to poll picker session: {0}")]
    Poll(String),

    #[error("Not authenticated")]
    Auth,

    #[error("Image too large: {actual} bytes exceeds maximum of {max} bytes")]
    SizeLimit { actual: usize, max: usize },

    #[error("Image fetch timed out, please try again")]
    FetchTimeout,

    #[error("Failed to fetch image (upstream status {status})")]
    Fetch { status: u16 },

    #[error("Vision service error: {0}")]
    Vision(String),

    #[error("Vision analysis timed out, please try again with a smaller image")]
    VisionTimeout,

    #[error("Generation service error: {0}")]
    Generation(String),

    #[error("Image generation timed out, please try again")]
    GenerationTimeout,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Access denied")]
    Forbidden,

    #[error("Invalid flow state: {0}")]
    FlowState(String),
}

impl RestyleError {
    fn status(&self) -> StatusCode {
        match self {
            RestyleError::Auth => StatusCode::UNAUTHORIZED,
            RestyleError::Forbidden => StatusCode::FORBIDDEN,
            RestyleError::NotFound(_) => StatusCode::NOT_FOUND,
            RestyleError::SizeLimit { .. }
            | RestyleError::InvalidInput(_)
            | RestyleError::FlowState(_) => StatusCode::BAD_REQUEST,
            RestyleError::PollTimeout
            | RestyleError::FetchTimeout
            | RestyleError::VisionTimeout
            | RestyleError::GenerationTimeout => StatusCode::GATEWAY_TIMEOUT,
            RestyleError::SessionCreate { .. }
            | RestyleError::Poll(_)
            | RestyleError::Fetch { .. }
            | RestyleError::Vision(_)
            | RestyleError::Generation(_) => StatusCode::BAD_GATEWAY,
            RestyleError::Storage(_) | RestyleError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RestyleError::SessionCreate { .. } => "Session error",
            RestyleError::PollTimeout | RestyleError::Poll(_) => "Selection error",
            RestyleError::Auth => "Authentication error",
            RestyleError::SizeLimit { .. } => "Image too large",
            RestyleError::FetchTimeout | RestyleError::Fetch { .. } => "Image fetch error",
            RestyleError::Vision(_) | RestyleError::VisionTimeout => "Vision error",
            RestyleError::Generation(_) | RestyleError::GenerationTimeout => "Generation error",
            RestyleError::InvalidInput(_) => "Validation error",
            RestyleError::Storage(_) => "Database error",
            RestyleError::Serialization(_) => "Data processing error",
            RestyleError::NotFound(_) => "Not found",
            RestyleError::Forbidden => "Access denied",
            RestyleError::FlowState(_) => "Flow error",
        }
    }
}

impl ResponseError for RestyleError {
    fn error_response(&self) -> HttpResponse {
        if self.status().is_server_error() {
            log::error!("{}", self);
        }
        HttpResponse::build(self.status()).json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string()
        }))
    }
}

impl From<redis::RedisError> for RestyleError {
    fn from(e: redis::RedisError) -> Self {
        RestyleError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RestyleError {
    fn from(e: serde_json::Error) -> Self {
        RestyleError::Serialization(e.to_string())
    }
}
