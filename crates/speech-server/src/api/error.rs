//! Mapping of engine and synthesizer errors to HTTP responses.

use actix_web::HttpResponse;
use serde::Serialize;
use speech_player::EnqueueError;
use utoipa::ToSchema;

use crate::synth::SynthError;

/// JSON error body.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
    BadGateway(String),
    Unavailable(String),
}

impl ApiError {
    pub fn into_response(self) -> HttpResponse {
        match self {
            ApiError::BadRequest(error) => HttpResponse::BadRequest().json(ErrorResponse { error }),
            ApiError::Internal(error) => {
                HttpResponse::InternalServerError().json(ErrorResponse { error })
            }
            ApiError::BadGateway(error) => HttpResponse::BadGateway().json(ErrorResponse { error }),
            ApiError::Unavailable(error) => {
                HttpResponse::ServiceUnavailable().json(ErrorResponse { error })
            }
        }
    }
}

impl From<EnqueueError> for ApiError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::ShuttingDown => ApiError::Unavailable(err.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<SynthError> for ApiError {
    fn from(err: SynthError) -> Self {
        match err {
            SynthError::EmptyText => ApiError::BadRequest(err.to_string()),
            SynthError::Spawn { .. } | SynthError::Process { .. } => {
                ApiError::BadGateway(err.to_string())
            }
            SynthError::NoAudio | SynthError::Decode(_) | SynthError::Io(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}
