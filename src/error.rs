use crate::audio::AudioError;
use crate::core::CoreError;
use crate::frontend::{KanaParseError, LexiconError};
use crate::manifest::ManifestError;
use crate::user_dict::UserDictError;

/// Every failure a request can run into.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Kana(#[from] KanaParseError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    UserDict(#[from] UserDictError),
    #[error(transparent)]
    Lexicon(#[from] LexiconError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Too many pending requests")]
    Busy,
    #[error("Worker task failed: {0}")]
    Task(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
