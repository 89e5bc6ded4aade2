use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("envelope too large: {size} bytes (max {max})")]
    EnvelopeTooLarge { size: usize, max: usize },

    #[error("message payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}
