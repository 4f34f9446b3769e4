use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::audio::AudioError;
use crate::core::CoreError;
use crate::error::EngineError;
use crate::user_dict::UserDictError;

impl EngineError {
    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::Core(CoreError::StyleNotFound(_)) | EngineError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::Core(CoreError::UnknownPhoneme(_)) | EngineError::InvalidInput(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::Kana(_) => StatusCode::BAD_REQUEST,
            EngineError::UserDict(e) => match e {
                UserDictError::WordNotFound(_) => StatusCode::NOT_FOUND,
                UserDictError::InvalidWord(_)
                | UserDictError::UnsupportedPartOfSpeech(_)
                | UserDictError::InvalidUuid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                UserDictError::Io(_) | UserDictError::Json(_) | UserDictError::Lexicon(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            EngineError::Audio(AudioError::ResamplerSetup(_) | AudioError::Resample(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            EngineError::Audio(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Core(_)
            | EngineError::Lexicon(_)
            | EngineError::Manifest(_)
            | EngineError::Zip(_)
            | EngineError::Io(_)
            | EngineError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            log::error!("Request failed: {self}");
        } else {
            log::debug!("Request rejected ({status}): {self}");
        }
        let detail = match &self {
            EngineError::Kana(e) => json!({
                "text": e.to_string(),
                "error_name": e.code(),
                "error_args": e.args(),
            }),
            _ => json!(self.to_string()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
