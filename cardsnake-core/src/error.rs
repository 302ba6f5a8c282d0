use thiserror::Error;

use crate::catalog::CardId;

#[derive(Error, Debug)]
pub enum CardError {
    #[error("Empty catalog: no entries with fingerprints passed the {filter} filter")]
    EmptyCatalog { filter: String },

    #[error("Descriptors unavailable for card {0}")]
    DescriptorUnavailable(CardId),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for CardError {
    fn from(err: image::ImageError) -> Self {
        CardError::ImageError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CardError>;
